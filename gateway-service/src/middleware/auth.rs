use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::Principal;
use crate::services::{extract_token, GatewayError, TokenError};
use crate::AppState;

/// Middleware requiring a valid gateway token.
///
/// The token is read from the configured header, validated, and the
/// principal it names is stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = req
        .headers()
        .get(state.config.jwt.header.as_str())
        .and_then(|value| value.to_str().ok());

    let Some(token) = extract_token(header_value, state.tokens.token_type()) else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid {} header",
            state.config.jwt.header
        )));
    };

    let claims = match state.tokens.validate(token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            tracing::info!("Rejected expired token");
            return Err(GatewayError::TokenExpired.into());
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected invalid token");
            return Err(GatewayError::TokenInvalid.into());
        }
    };

    let principal = claims
        .to_principal(state.config.default_domain)
        .map_err(|e| {
            tracing::warn!(error = %e, "Token carries an unknown domain");
            AppError::from(GatewayError::TokenInvalid)
        })?;

    tracing::debug!(user = %principal.username, domain = %principal.domain, "Authenticated request");
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Extractor for the principal stored by [`auth_middleware`].
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Principal missing from request extensions"
            ))
        })?;

        Ok(AuthUser(principal.clone()))
    }
}
