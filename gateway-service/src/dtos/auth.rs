use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{AuthDomain, Principal};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 256, message = "Username is required"))]
    #[schema(example = "alice")]
    pub username: String,

    #[schema(value_type = String, example = "password123")]
    pub password: SecretString,

    /// Domain to log into; the configured default when absent.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "prod")]
    pub domain: Option<AuthDomain>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "Alice Example")]
    pub display_name: String,
    #[schema(example = "prod")]
    pub domain: String,
    pub roles: Vec<String>,
}

impl From<&Principal> for UserResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            username: principal.username.clone(),
            display_name: principal.display_name_or_username().to_string(),
            domain: principal.domain.to_string(),
            roles: principal.roles.clone(),
        }
    }
}
