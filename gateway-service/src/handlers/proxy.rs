use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
};
use service_core::error::AppError;

use crate::{middleware::AuthUser, AppState};

/// Relays an authenticated request to the upstream UI/API with the proxy
/// prefix removed from its path.
pub async fn forward(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    request: Request,
) -> Result<Response<Body>, AppError> {
    let prefix = state.config.proxy.path_prefix.trim_end_matches('/');
    let path = request.uri().path();
    let upstream_path = path.strip_prefix(prefix).unwrap_or(path).to_string();

    tracing::debug!(
        user = %principal.username,
        path = %upstream_path,
        "Proxying request"
    );

    Ok(state.proxy.forward(request, &upstream_path).await?)
}
