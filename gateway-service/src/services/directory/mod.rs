//! Username/password authentication against a corporate directory.
//!
//! The authenticator resolves the user's DN with a subtree search, binds
//! with the supplied password, and turns a successful bind into a
//! [`Principal`]. The network side sits behind [`DirectoryConnector`] so the
//! LDAP pool can be swapped for [`MockDirectory`] in tests.

mod ldap;
mod mock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::cache::LruCache;
use super::GatewayError;
use crate::config::LdapConfig;
use crate::models::{AuthDomain, Credentials, Principal};

pub use ldap::LdapDirectory;
pub use mock::MockDirectory;

pub const SEARCH_CACHE_SIZE_METRIC: &str = "gateway_directory_cache_size";

/// Result of binding as a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Accepted,
    /// The directory refused the credentials (invalid credentials result).
    Rejected,
}

#[derive(Debug, Error, Clone)]
pub enum DirectoryError {
    #[error("directory unreachable: {0}")]
    Unavailable(String),

    #[error("directory operation timed out: {0}")]
    Timeout(String),

    #[error("directory protocol error: {0}")]
    Protocol(String),
}

impl From<DirectoryError> for GatewayError {
    fn from(err: DirectoryError) -> Self {
        GatewayError::ServiceUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// DNs of all entries under `base_dn` (subtree) matching `filter`.
    async fn search_dns(&self, base_dn: &str, filter: &str) -> Result<Vec<String>, DirectoryError>;

    async fn bind(&self, dn: &str, password: &SecretString) -> Result<BindOutcome, DirectoryError>;
}

pub struct DirectoryAuthenticator {
    connector: Arc<dyn DirectoryConnector>,
    base_dn: String,
    filter_template: String,
    default_role: String,
    username_pattern: Regex,
    search_cache: Arc<LruCache<String, String>>,
}

impl DirectoryAuthenticator {
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        config: &LdapConfig,
    ) -> Result<Self, anyhow::Error> {
        Self::with_cache_settings(
            connector,
            config,
            config.search_cache_capacity,
            config.search_cache_ttl(),
        )
    }

    pub fn with_cache_settings(
        connector: Arc<dyn DirectoryConnector>,
        config: &LdapConfig,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            connector,
            base_dn: config.base_dn.clone(),
            filter_template: config.user_search_filter.clone(),
            default_role: config.default_role.clone(),
            username_pattern: Regex::new(r"^[A-Za-z0-9._-]+$")?,
            search_cache: Arc::new(LruCache::new(
                cache_capacity,
                Some(cache_ttl),
                SEARCH_CACHE_SIZE_METRIC,
            )),
        })
    }

    /// Shared handle to the DN search cache, for the janitor task and
    /// operational stats.
    pub fn search_cache(&self) -> Arc<LruCache<String, String>> {
        self.search_cache.clone()
    }

    #[tracing::instrument(skip(self, credentials), fields(username = %credentials.username, domain = %domain))]
    pub async fn authenticate(
        &self,
        credentials: Credentials,
        domain: AuthDomain,
    ) -> Result<Principal, GatewayError> {
        if !self.username_pattern.is_match(&credentials.username) {
            tracing::warn!("Rejected login with malformed username");
            metrics::counter!("gateway_login_total", "outcome" => "rejected_input").increment(1);
            return Err(GatewayError::InvalidUsername);
        }

        if secrecy::ExposeSecret::expose_secret(credentials.password()).is_empty() {
            // An empty simple bind is an anonymous bind and would succeed.
            metrics::counter!("gateway_login_total", "outcome" => "invalid_credentials")
                .increment(1);
            return Err(GatewayError::InvalidCredentials);
        }

        let dn = match self.resolve_dn(&credentials.username).await {
            Ok(Some(dn)) => dn,
            Ok(None) => {
                tracing::info!("User not found in directory");
                metrics::counter!("gateway_login_total", "outcome" => "invalid_credentials")
                    .increment(1);
                return Err(GatewayError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(error = %e, "Directory search failed");
                metrics::counter!("gateway_login_total", "outcome" => "unavailable").increment(1);
                return Err(e.into());
            }
        };

        let outcome = self
            .connector
            .bind(&dn, credentials.password())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Directory bind failed");
                metrics::counter!("gateway_login_total", "outcome" => "unavailable").increment(1);
                GatewayError::from(e)
            })?;

        let Credentials { username, .. } = credentials;

        if outcome == BindOutcome::Rejected {
            tracing::info!("Directory rejected credentials");
            metrics::counter!("gateway_login_total", "outcome" => "invalid_credentials")
                .increment(1);
            return Err(GatewayError::InvalidCredentials);
        }

        let mut principal = Principal::new(username, domain).with_role(self.default_role.clone());
        if let Some(cn) = common_name(&dn) {
            principal = principal.with_display_name(cn);
        }

        tracing::info!(dn = %dn, "User authenticated");
        metrics::counter!("gateway_login_total", "outcome" => "success").increment(1);
        Ok(principal)
    }

    async fn resolve_dn(&self, username: &str) -> Result<Option<String>, DirectoryError> {
        let cache_key = format!("{}|{}|sub", username, self.base_dn);
        if let Some(dn) = self.search_cache.get(&cache_key) {
            tracing::debug!("DN search cache hit");
            return Ok(Some(dn));
        }

        let filter = self
            .filter_template
            .replace("{0}", &ldap3::ldap_escape(username));
        let mut dns = self.connector.search_dns(&self.base_dn, &filter).await?;

        match dns.len() {
            0 => Ok(None),
            1 => {
                let dn = dns.remove(0);
                self.search_cache.insert(cache_key, dn.clone());
                Ok(Some(dn))
            }
            n => {
                tracing::warn!(matches = n, "Username matched several directory entries");
                Ok(None)
            }
        }
    }
}

/// First `CN` value of a DN, with escapes removed.
pub fn common_name(dn: &str) -> Option<String> {
    split_rdns(dn).into_iter().find_map(|rdn| {
        let (attr, value) = rdn.split_once('=')?;
        if attr.trim().eq_ignore_ascii_case("cn") {
            let value = unescape_dn_value(value.trim());
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

fn split_rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' | ';' if !escaped => {
                parts.push(&dn[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(&dn[start..]);
    parts
}

fn unescape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
