use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;

use crate::config::TenantEndpoint;
use crate::models::{AppGroup, Principal};
use crate::services::GatewayError;

/// Asks the managed-service platform whether a user may act on a namespace.
pub struct ManagedServiceBackend {
    http: reqwest::Client,
    url: String,
    token: SecretString,
    token_header: String,
}

#[derive(Debug, Serialize)]
struct AuthorizationRequest<'a> {
    namespace: &'a str,
    credential: Vec<CredentialRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct CredentialRequest<'a> {
    user: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorizationResponse {
    Bare(Vec<CredentialDecision>),
    Wrapped { credential: Vec<CredentialDecision> },
}

#[derive(Debug, Deserialize)]
struct CredentialDecision {
    user: String,
    #[serde(default)]
    authorized: bool,
}

impl AuthorizationResponse {
    fn authorizes(&self, username: &str) -> bool {
        let decisions = match self {
            AuthorizationResponse::Bare(list) => list,
            AuthorizationResponse::Wrapped { credential } => credential,
        };
        decisions
            .iter()
            .any(|d| d.authorized && d.user.eq_ignore_ascii_case(username))
    }
}

impl ManagedServiceBackend {
    pub fn new(endpoint: &TenantEndpoint, token_header: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(endpoint.timeout())
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| {
                GatewayError::ServiceUnavailable(format!("managed service client: {}", e))
            })?;

        Ok(Self {
            http,
            url: endpoint.url.clone(),
            token: endpoint.token.clone(),
            token_header: token_header.to_string(),
        })
    }

    pub async fn authorize(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<bool, GatewayError> {
        let body = AuthorizationRequest {
            namespace: group.name(),
            credential: vec![CredentialRequest {
                user: &principal.username,
            }],
        };

        let response = self
            .http
            .traced_post(&self.url)
            .header(&self.token_header, self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.url, "Managed service authorization call failed");
                GatewayError::ServiceUnavailable(format!("managed service: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, group = %group, "Managed service denied authorization");
            return Ok(false);
        }

        let bytes = response.bytes().await.map_err(|e| {
            tracing::error!(error = %e, url = %self.url, "Managed service response could not be read");
            GatewayError::ServiceUnavailable(format!("managed service: {}", e))
        })?;

        match serde_json::from_slice::<AuthorizationResponse>(&bytes) {
            Ok(decision) => Ok(decision.authorizes(&principal.username)),
            Err(e) => {
                tracing::warn!(error = %e, group = %group, "Malformed managed service response");
                Ok(false)
            }
        }
    }
}
