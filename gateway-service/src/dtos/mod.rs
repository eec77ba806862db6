pub mod apps;
pub mod auth;

pub use apps::{
    AccessResponse, ClientResponse, CreateClientRequest, CreateSecretRequest, SecretResponse,
};
pub use auth::{LoginRequest, UserResponse};
