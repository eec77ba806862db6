use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use service_core::observability::TracedClientExt;

use crate::config::TenantEndpoint;
use crate::models::{AppGroup, Principal};
use crate::services::GatewayError;

/// Delegates the decision to the tenant system owning the project.
pub struct DelegatedTenantBackend {
    http: reqwest::Client,
    url: String,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct TenantDecision {
    #[serde(default)]
    authorized: bool,
}

impl DelegatedTenantBackend {
    pub fn new(endpoint: &TenantEndpoint) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(endpoint.timeout())
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| {
                GatewayError::ServiceUnavailable(format!("delegated tenant client: {}", e))
            })?;

        Ok(Self {
            http,
            url: endpoint.url.trim_end_matches('/').to_string(),
            token: endpoint.token.clone(),
        })
    }

    pub async fn authorize(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<bool, GatewayError> {
        let [org, project, env] = tenant_segments(group.name()).ok_or_else(|| {
            GatewayError::NotAuthorized(format!(
                "'{}' is not a valid org/project/env group name",
                group.name()
            ))
        })?;

        let url = format!(
            "{}/{}/{}/{}/{}",
            self.url,
            urlencoding::encode(&principal.username),
            urlencoding::encode(org),
            urlencoding::encode(project),
            urlencoding::encode(env)
        );

        let response = self
            .http
            .traced_get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Delegated tenant authorization call failed");
                GatewayError::ServiceUnavailable(format!("delegated tenant: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, group = %group, "Delegated tenant denied authorization");
            return Ok(false);
        }

        let bytes = response.bytes().await.map_err(|e| {
            tracing::error!(error = %e, "Delegated tenant response could not be read");
            GatewayError::ServiceUnavailable(format!("delegated tenant: {}", e))
        })?;

        match serde_json::from_slice::<TenantDecision>(&bytes) {
            Ok(decision) => Ok(decision.authorized),
            Err(e) => {
                tracing::warn!(error = %e, group = %group, "Malformed delegated tenant response");
                Ok(false)
            }
        }
    }
}

/// Splits a group name on `_` or `/` into exactly three non-blank segments.
fn tenant_segments(name: &str) -> Option<[&str; 3]> {
    let segments: Vec<&str> = name.split(['_', '/']).collect();
    match segments.as_slice() {
        [org, project, env] if segments.iter().all(|s| !s.trim().is_empty()) => {
            Some([*org, *project, *env])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_segments() {
        assert_eq!(tenant_segments("org_proj_env"), Some(["org", "proj", "env"]));
        assert_eq!(tenant_segments("org/proj/env"), Some(["org", "proj", "env"]));
        assert_eq!(tenant_segments("org_proj/env"), Some(["org", "proj", "env"]));
        assert_eq!(tenant_segments("org_proj"), None);
        assert_eq!(tenant_segments("org_proj_env_x"), None);
        assert_eq!(tenant_segments("org__env"), None);
    }
}
