use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{AuthDomain, DEFAULT_ROLE};

/// Prefix of environment variables overriding configuration, e.g.
/// `GATEWAY__JWT__EXPIRY_SECONDS=900`.
pub const ENV_PREFIX: &str = "GATEWAY";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: core_config::Config,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    /// Domain assumed for logins that do not name one.
    #[serde(default = "default_domain")]
    pub default_domain: AuthDomain,
    pub jwt: JwtConfig,
    pub ldap: LdapConfig,
    #[serde(default)]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    pub secrets_store: SecretStoreConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC-SHA-512 key; at least 64 bytes.
    pub signing_key: SecretString,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_token_expiry_seconds")]
    pub expiry_seconds: i64,
    /// Request header carrying the token.
    #[serde(default = "default_token_header")]
    pub header: String,
    /// Scheme prefix of the header value, also returned as `tokenType`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    pub url: String,
    pub base_dn: String,
    /// Search filter, `{0}` is replaced by the escaped username.
    #[serde(default = "default_user_search_filter")]
    pub user_search_filter: String,
    pub bind_dn: String,
    pub bind_password: SecretString,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_ldap_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_ldap_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default = "default_ldap_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
    #[serde(default = "default_search_cache_capacity")]
    pub search_cache_capacity: usize,
    #[serde(default = "default_search_cache_ttl_seconds")]
    pub search_cache_ttl_seconds: u64,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub no_tls_verify: bool,
}

impl LdapConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    pub fn search_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.search_cache_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Team whose members may manage secrets of every assembly in the org;
    /// `{admin_team}-{assembly}` grants a single assembly.
    #[serde(default = "default_admin_team")]
    pub admin_team: String,
    #[serde(default = "default_managed_service_org_prefix")]
    pub managed_service_org_prefix: String,
    #[serde(default = "default_delegated_tenant_domain_prefix")]
    pub delegated_tenant_domain_prefix: String,
    #[serde(default = "default_managed_service_token_header")]
    pub managed_service_token_header: String,
    #[serde(default)]
    pub managed_service: HashMap<AuthDomain, TenantEndpoint>,
    #[serde(default)]
    pub delegated_tenant: HashMap<AuthDomain, TenantEndpoint>,
    #[serde(default = "default_client_cache_capacity")]
    pub client_cache_capacity: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            admin_team: default_admin_team(),
            managed_service_org_prefix: default_managed_service_org_prefix(),
            delegated_tenant_domain_prefix: default_delegated_tenant_domain_prefix(),
            managed_service_token_header: default_managed_service_token_header(),
            managed_service: HashMap::new(),
            delegated_tenant: HashMap::new(),
            client_cache_capacity: default_client_cache_capacity(),
        }
    }
}

/// Remote authorization endpoint of one tenant system in one domain.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEndpoint {
    pub url: String,
    pub token: SecretString,
    #[serde(default = "default_tenant_timeout_ms")]
    pub timeout_ms: u64,
}

impl TenantEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TeamsConfig {
    /// Postgres URL of the team database. Without it the gateway runs with
    /// an empty in-memory team table and local groups always fail closed.
    #[serde(default)]
    pub database_url: Option<SecretString>,
    #[serde(default = "default_team_db_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretStoreConfig {
    pub url: String,
    /// PEM bundle with client certificate and private key for mutual TLS.
    #[serde(default)]
    pub client_identity_pem_path: Option<String>,
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default = "default_secret_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl SecretStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub target: String,
    #[serde(default = "default_proxy_path_prefix")]
    pub path_prefix: String,
    /// Accept any upstream certificate. Dangerous; off unless set.
    #[serde(default)]
    pub trust_all_certs: bool,
    /// Extra request headers removed before forwarding, besides the token
    /// header and hop-by-hop headers.
    #[serde(default = "default_proxy_strip_headers")]
    pub strip_headers: Vec<String>,
    #[serde(default = "default_proxy_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_proxy_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_environment() -> Environment {
    Environment::Dev
}

fn default_service_name() -> String {
    "gateway-service".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_domain() -> AuthDomain {
    AuthDomain::Prod
}

fn default_issuer() -> String {
    "secrets-gateway".to_string()
}

fn default_token_expiry_seconds() -> i64 {
    3600
}

fn default_token_header() -> String {
    "Authorization".to_string()
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_user_search_filter() -> String {
    "(sAMAccountName={0})".to_string()
}

fn default_pool_size() -> usize {
    8
}

fn default_ldap_connect_timeout_ms() -> u64 {
    5_000
}

fn default_ldap_operation_timeout_ms() -> u64 {
    10_000
}

fn default_ldap_pool_timeout_ms() -> u64 {
    5_000
}

fn default_search_cache_capacity() -> usize {
    100
}

fn default_search_cache_ttl_seconds() -> u64 {
    30 * 60
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

fn default_admin_team() -> String {
    "keywhiz-admin".to_string()
}

fn default_managed_service_org_prefix() -> String {
    "ms-".to_string()
}

fn default_delegated_tenant_domain_prefix() -> String {
    "tenant-".to_string()
}

fn default_managed_service_token_header() -> String {
    "X-Auth-Token".to_string()
}

fn default_client_cache_capacity() -> usize {
    1024
}

fn default_tenant_timeout_ms() -> u64 {
    5_000
}

fn default_team_db_max_connections() -> u32 {
    5
}

fn default_secret_store_timeout_ms() -> u64 {
    10_000
}

fn default_proxy_path_prefix() -> String {
    "/proxy".to_string()
}

fn default_proxy_strip_headers() -> Vec<String> {
    vec!["x-xsrf-token".to_string(), "x-csrf-token".to_string()]
}

fn default_proxy_connect_timeout_ms() -> u64 {
    5_000
}

fn default_proxy_timeout_ms() -> u64 {
    30_000
}

fn default_proxy_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: GatewayConfig = core_config::load(ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(config_error("server.port must be greater than 0"));
        }

        if self.jwt.expiry_seconds <= 0 {
            return Err(config_error("jwt.expiry_seconds must be positive"));
        }

        if self.jwt.signing_key.expose_secret().len() < 64 {
            return Err(config_error(
                "jwt.signing_key must be at least 64 bytes for HS512",
            ));
        }

        if self.jwt.header.trim().is_empty() {
            return Err(config_error("jwt.header must not be empty"));
        }

        if !self.ldap.user_search_filter.contains("{0}") {
            return Err(config_error(
                "ldap.user_search_filter must contain the {0} placeholder",
            ));
        }

        if self.ldap.base_dn.trim().is_empty() {
            return Err(config_error("ldap.base_dn must not be empty"));
        }

        let role = &self.ldap.default_role;
        if role.is_empty() || role.contains(',') || role.trim() != role.as_str() {
            return Err(config_error(
                "ldap.default_role must be non-empty without commas or surrounding whitespace",
            ));
        }

        if self.ldap.pool_size == 0 {
            return Err(config_error("ldap.pool_size must be greater than 0"));
        }

        if self.ldap.search_cache_capacity == 0 || self.authz.client_cache_capacity == 0 {
            return Err(config_error("cache capacities must be greater than 0"));
        }

        for (domain, endpoint) in self
            .authz
            .managed_service
            .iter()
            .chain(self.authz.delegated_tenant.iter())
        {
            url::Url::parse(&endpoint.url).map_err(|e| {
                config_error(&format!(
                    "invalid tenant endpoint url for domain {}: {}",
                    domain, e
                ))
            })?;
        }

        url::Url::parse(&self.secrets_store.url)
            .map_err(|e| config_error(&format!("invalid secrets_store.url: {}", e)))?;

        url::Url::parse(&self.proxy.target)
            .map_err(|e| config_error(&format!("invalid proxy.target: {}", e)))?;

        if !self.proxy.path_prefix.starts_with('/') || self.proxy.path_prefix.len() < 2 {
            return Err(config_error(
                "proxy.path_prefix must start with '/' and not be the root",
            ));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(config_error(
                "Wildcard CORS origin not allowed in production",
            ));
        }

        Ok(())
    }

    /// Enabled settings that turn off certificate verification. Logged at
    /// startup once tracing is up.
    pub fn insecure_settings(&self) -> Vec<&'static str> {
        let mut settings = Vec::new();
        if self.ldap.no_tls_verify {
            settings.push("ldap.no_tls_verify");
        }
        if self.proxy.trust_all_certs {
            settings.push("proxy.trust_all_certs");
        }
        settings
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}
