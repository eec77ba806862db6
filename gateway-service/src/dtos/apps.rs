use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::services::{ClientDetail, SecretDetail};

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessResponse {
    #[schema(example = true)]
    pub authorized: bool,
    /// Canonical group path.
    #[schema(example = "/prod/oneops/myapp/prod")]
    pub group: String,
    #[schema(example = "alice")]
    pub user: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSecretRequest {
    /// Base64 encoded secret content.
    #[validate(length(min = 1, message = "Secret content is required"))]
    #[schema(example = "c2VjcmV0")]
    pub content: String,

    #[validate(length(max = 1024, message = "Description is too long"))]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    #[schema(example = "db-password")]
    pub name: String,
    #[schema(example = "prod_oneops_myapp_prod@db-password")]
    pub unique_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl SecretResponse {
    pub fn new(short_name: String, detail: SecretDetail) -> Self {
        Self {
            name: short_name,
            unique_name: detail.name,
            description: detail.description,
            checksum: detail.checksum,
            created_by: detail.created_by,
            created_at_seconds: detail.created_at_seconds,
            expiry: detail.expiry,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(length(max = 1024, message = "Description is too long"))]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    #[schema(example = "myapp-web")]
    pub name: String,
    #[schema(example = "prod_oneops_myapp_prod@myapp-web")]
    pub unique_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClientResponse {
    pub fn new(short_name: String, detail: ClientDetail) -> Self {
        Self {
            name: short_name,
            unique_name: detail.name,
            description: detail.description,
        }
    }
}
