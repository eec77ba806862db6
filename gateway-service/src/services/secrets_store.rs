//! Client for the central secrets-management backend (automation v2 API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

use super::GatewayError;
use crate::config::SecretStoreConfig;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("secrets store returned {0}: {1}")]
    Status(u16, String),

    #[error("secrets store unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected secrets store response: {0}")]
    InvalidResponse(String),
}

impl From<SecretStoreError> for GatewayError {
    fn from(err: SecretStoreError) -> Self {
        match err {
            SecretStoreError::NotFound(what) => GatewayError::NotFound(what),
            SecretStoreError::Conflict(what) => GatewayError::Conflict(what),
            SecretStoreError::Status(..) | SecretStoreError::InvalidResponse(_) => {
                GatewayError::UpstreamGateway(err.to_string())
            }
            SecretStoreError::Unavailable(msg) => GatewayError::ServiceUnavailable(msg),
        }
    }
}

/// Secret metadata. Content is never returned by the store's listing calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDetail {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at_seconds: Option<i64>,
    #[serde(default)]
    pub expiry: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecret {
    pub name: String,
    /// Base64 encoded secret content.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateClient {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateGroup<'a> {
    name: &'a str,
    description: &'a str,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Creates the group unless it already exists.
    async fn ensure_group(&self, group: &str, description: &str) -> Result<(), SecretStoreError>;
    async fn list_group_secrets(&self, group: &str) -> Result<Vec<SecretDetail>, SecretStoreError>;
    async fn get_secret(&self, name: &str) -> Result<SecretDetail, SecretStoreError>;
    async fn create_secret(&self, request: &CreateSecret) -> Result<(), SecretStoreError>;
    async fn delete_secret(&self, name: &str) -> Result<(), SecretStoreError>;
    async fn list_group_clients(&self, group: &str) -> Result<Vec<ClientDetail>, SecretStoreError>;
    async fn create_client(&self, request: &CreateClient) -> Result<(), SecretStoreError>;
    async fn delete_client(&self, name: &str) -> Result<(), SecretStoreError>;
}

/// Talks to the store over mutual TLS.
pub struct HttpSecretStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSecretStore {
    pub fn new(config: &SecretStoreConfig) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .use_rustls_tls();

        if let Some(path) = &config.client_identity_pem_path {
            let pem = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("failed to read client identity {}: {}", path, e))?;
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("failed to read CA certificate {}: {}", path, e))?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        tracing::info!(url = %config.url, mtls = config.client_identity_pem_path.is_some(), "Secrets store client configured");

        Ok(Self {
            http: builder.build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/automation/v2{}", self.base_url, path)
    }

    async fn check(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, SecretStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(SecretStoreError::NotFound(what.to_string())),
            409 => Err(SecretStoreError::Conflict(what.to_string())),
            code => {
                tracing::warn!(status = code, what, "Secrets store call failed");
                Err(SecretStoreError::Status(code, body))
            }
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SecretStoreError> {
        response
            .json::<T>()
            .await
            .map_err(|e| SecretStoreError::InvalidResponse(e.to_string()))
    }
}

fn transport(err: reqwest::Error) -> SecretStoreError {
    tracing::error!(error = %err, "Secrets store request failed");
    SecretStoreError::Unavailable(err.to_string())
}

fn segment(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn ensure_group(&self, group: &str, description: &str) -> Result<(), SecretStoreError> {
        let response = self
            .http
            .traced_post(&self.url("/groups"))
            .json(&CreateGroup {
                name: group,
                description,
            })
            .send()
            .await
            .map_err(transport)?;

        match Self::check(response, group).await {
            Ok(_) => {
                tracing::info!(group, "Created group in secrets store");
                Ok(())
            }
            Err(SecretStoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_group_secrets(&self, group: &str) -> Result<Vec<SecretDetail>, SecretStoreError> {
        let url = self.url(&format!("/groups/{}/secrets", segment(group)));
        let response = self.http.traced_get(&url).send().await.map_err(transport)?;
        Self::json(Self::check(response, group).await?).await
    }

    async fn get_secret(&self, name: &str) -> Result<SecretDetail, SecretStoreError> {
        let url = self.url(&format!("/secrets/{}", segment(name)));
        let response = self.http.traced_get(&url).send().await.map_err(transport)?;
        Self::json(Self::check(response, name).await?).await
    }

    async fn create_secret(&self, request: &CreateSecret) -> Result<(), SecretStoreError> {
        let response = self
            .http
            .traced_post(&self.url("/secrets"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, &request.name).await?;
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), SecretStoreError> {
        let url = self.url(&format!("/secrets/{}", segment(name)));
        let response = self.http.traced_delete(&url).send().await.map_err(transport)?;
        Self::check(response, name).await?;
        Ok(())
    }

    async fn list_group_clients(&self, group: &str) -> Result<Vec<ClientDetail>, SecretStoreError> {
        let url = self.url(&format!("/groups/{}/clients", segment(group)));
        let response = self.http.traced_get(&url).send().await.map_err(transport)?;
        Self::json(Self::check(response, group).await?).await
    }

    async fn create_client(&self, request: &CreateClient) -> Result<(), SecretStoreError> {
        let response = self
            .http
            .traced_post(&self.url("/clients"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, &request.name).await?;
        Ok(())
    }

    async fn delete_client(&self, name: &str) -> Result<(), SecretStoreError> {
        let url = self.url(&format!("/clients/{}", segment(name)));
        let response = self.http.traced_delete(&url).send().await.map_err(transport)?;
        Self::check(response, name).await?;
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MockSecretStore {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    groups: BTreeMap<String, String>,
    secrets: BTreeMap<String, (SecretDetail, Vec<String>)>,
    clients: BTreeMap<String, (ClientDetail, Vec<String>)>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.lock().groups.contains_key(group)
    }

    pub fn secret_names(&self) -> Vec<String> {
        self.lock().secrets.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn ensure_group(&self, group: &str, description: &str) -> Result<(), SecretStoreError> {
        self.lock()
            .groups
            .entry(group.to_string())
            .or_insert_with(|| description.to_string());
        Ok(())
    }

    async fn list_group_secrets(&self, group: &str) -> Result<Vec<SecretDetail>, SecretStoreError> {
        let state = self.lock();
        if !state.groups.contains_key(group) {
            return Err(SecretStoreError::NotFound(group.to_string()));
        }
        Ok(state
            .secrets
            .values()
            .filter(|(_, groups)| groups.iter().any(|g| g == group))
            .map(|(detail, _)| detail.clone())
            .collect())
    }

    async fn get_secret(&self, name: &str) -> Result<SecretDetail, SecretStoreError> {
        self.lock()
            .secrets
            .get(name)
            .map(|(detail, _)| detail.clone())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    async fn create_secret(&self, request: &CreateSecret) -> Result<(), SecretStoreError> {
        let mut state = self.lock();
        if state.secrets.contains_key(&request.name) {
            return Err(SecretStoreError::Conflict(request.name.clone()));
        }
        let detail = SecretDetail {
            name: request.name.clone(),
            description: request.description.clone(),
            checksum: None,
            created_by: request.metadata.get("owner").cloned(),
            created_at_seconds: None,
            expiry: None,
        };
        state
            .secrets
            .insert(request.name.clone(), (detail, request.groups.clone()));
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), SecretStoreError> {
        self.lock()
            .secrets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    async fn list_group_clients(&self, group: &str) -> Result<Vec<ClientDetail>, SecretStoreError> {
        let state = self.lock();
        if !state.groups.contains_key(group) {
            return Err(SecretStoreError::NotFound(group.to_string()));
        }
        Ok(state
            .clients
            .values()
            .filter(|(_, groups)| groups.iter().any(|g| g == group))
            .map(|(detail, _)| detail.clone())
            .collect())
    }

    async fn create_client(&self, request: &CreateClient) -> Result<(), SecretStoreError> {
        let mut state = self.lock();
        if state.clients.contains_key(&request.name) {
            return Err(SecretStoreError::Conflict(request.name.clone()));
        }
        let detail = ClientDetail {
            name: request.name.clone(),
            description: request.description.clone(),
            created_by: None,
        };
        state
            .clients
            .insert(request.name.clone(), (detail, request.groups.clone()));
        Ok(())
    }

    async fn delete_client(&self, name: &str) -> Result<(), SecretStoreError> {
        self.lock()
            .clients
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }
}
