use axum::{
    body::Body,
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::error::ErrorBody;

/// Fills in the `path` field of error bodies produced by
/// [`crate::error::AppError`].
///
/// Responses that did not come from `AppError` pass through untouched.
pub async fn error_envelope_middleware(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let Some(body) = response.extensions().get::<ErrorBody>().cloned() else {
        return response;
    };

    let envelope = body.with_path(path);
    let bytes = match serde_json::to_vec(&envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error envelope");
            return response;
        }
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.extensions.insert(envelope);

    Response::from_parts(parts, Body::from(bytes))
}
