use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use super::clock::{Clock, SystemClock};
use super::GatewayError;
use crate::config::JwtConfig;
use crate::models::{AuthDomain, Principal};

/// Stateless bearer token service (HS512).
///
/// Nothing is stored server side; a token is valid while its signature
/// checks out and the clock has not reached `exp`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiry_seconds: i64,
    token_type: String,
    clock: Arc<dyn Clock>,
}

/// Claims carried by every gateway token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username)
    pub sub: String,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Comma-joined role names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Display name resolved at login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
}

impl TokenClaims {
    pub fn roles(&self) -> Vec<String> {
        self.roles
            .as_deref()
            .map(|joined| {
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Re-hydrates the principal the token was issued for. Tokens without a
    /// domain claim get `default_domain`.
    pub fn to_principal(&self, default_domain: AuthDomain) -> Result<Principal, TokenError> {
        let domain = match self.domain.as_deref() {
            Some(token) => token
                .parse::<AuthDomain>()
                .map_err(|e| TokenError::Invalid(e.to_string()))?,
            None => default_domain,
        };

        Ok(Principal {
            username: self.sub.clone(),
            display_name: self.cn.clone(),
            domain,
            roles: self.roles(),
        })
    }
}

/// Access token handed back by a successful login.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    #[schema(example = "eyJhbGciOiJIUzUxMiJ9...")]
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    #[schema(example = 3600)]
    pub expires_in_sec: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Well-formed and correctly signed, but past `exp`.
    #[error("token expired")]
    Expired,

    /// Bad signature, algorithm, issuer or structure.
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Role names travel comma-joined, so they cannot hold a comma or
    /// surrounding whitespace, and cannot be empty.
    #[error("role name {0:?} cannot be carried in a token")]
    UnsupportedRole(String),
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => GatewayError::TokenExpired,
            TokenError::Invalid(_) => GatewayError::TokenInvalid,
            TokenError::Signing(msg) => GatewayError::Internal(anyhow::anyhow!(msg)),
            TokenError::UnsupportedRole(role) => {
                GatewayError::Internal(anyhow::anyhow!("unsupported role name {:?}", role))
            }
        }
    }
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, anyhow::Error> {
        let key = config.signing_key.expose_secret().as_bytes();
        if key.is_empty() {
            return Err(anyhow::anyhow!("JWT signing key must not be empty"));
        }

        tracing::info!(issuer = %config.issuer, "Token service initialized with HS512 key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            issuer: config.issuer.clone(),
            expiry_seconds: config.expiry_seconds,
            token_type: config.token_type.clone(),
            clock,
        })
    }

    pub fn issue(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        if let Some(role) = principal
            .roles
            .iter()
            .find(|r| r.is_empty() || r.contains(',') || r.trim() != r.as_str())
        {
            return Err(TokenError::UnsupportedRole(role.clone()));
        }

        let now = self.clock.now();
        let exp = now + Duration::seconds(self.expiry_seconds);

        let claims = TokenClaims {
            sub: principal.username.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            roles: (!principal.roles.is_empty()).then(|| principal.roles.join(",")),
            domain: Some(principal.domain.to_string()),
            cn: principal.display_name.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            access_token: token,
            token_type: self.token_type.clone(),
            expires_in_sec: self.expiry_seconds,
        })
    }

    /// Checks signature, algorithm and issuer first, then expiry against the
    /// service clock. A tampered expired token is `Invalid`, not `Expired`.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iss"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?
            .claims;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_seconds
    }
}

/// Pulls the token out of an auth header value: strips `prefix`, trims, and
/// returns `None` when the prefix is missing or nothing is left.
pub fn extract_token<'a>(header_value: Option<&'a str>, prefix: &str) -> Option<&'a str> {
    let value = header_value?.trim_start();
    let rest = value.strip_prefix(prefix)?;

    // "Bearerabc" is not "Bearer abc".
    let prefix_ends_with_space = prefix.chars().last().is_some_and(char::is_whitespace);
    if !prefix.is_empty()
        && !prefix_ends_with_space
        && !rest.is_empty()
        && !rest.starts_with(char::is_whitespace)
    {
        return None;
    }

    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}
