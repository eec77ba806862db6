use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed application group, secret name or domain token.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Username rejected by the allow-list before any directory call.
    #[error("Invalid username")]
    InvalidUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Directory or tenant backend unreachable, timed out, or misconfigured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The proxied upstream hop failed.
    #[error("Upstream gateway error: {0}")]
    UpstreamGateway(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidFormat(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            // Indistinguishable from a bad password for the caller.
            GatewayError::InvalidUsername | GatewayError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid username or password"))
            }
            GatewayError::ServiceUnavailable(msg) => AppError::ServiceUnavailable(msg),
            GatewayError::TokenExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Token expired, please log in again"))
            }
            GatewayError::TokenInvalid => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            GatewayError::NotAuthorized(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            GatewayError::UpstreamGateway(msg) => AppError::BadGateway(msg),
            GatewayError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            GatewayError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            GatewayError::Internal(e) => AppError::InternalError(e),
        }
    }
}
