use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::error::AppError;

use super::AppState;

/// Guards `/api/v1` with the key configured in `api.key`.
///
/// The key is read from the `api.header` request header. Requests pass through
/// unchecked when no key is configured.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let api = &state.settings.api;
    let Some(expected) = api.key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req.headers().get(api.header.as_str());
    let present = provided.is_some();
    let accepted = provided.and_then(|v| v.to_str().ok()) == Some(expected);

    if accepted {
        return Ok(next.run(req).await);
    }

    tracing::warn!(
        path = %req.uri().path(),
        header = %api.header,
        present,
        "Rejected request without a valid API key"
    );
    if present {
        Err(AppError::Auth("Invalid API key".to_string()))
    } else {
        Err(AppError::Auth(format!("Missing {} header", api.header)))
    }
}
