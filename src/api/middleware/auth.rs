use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;

/// Lowercase so it can be used as a static `HeaderName`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejects requests without a configured `X-API-Key`. No keys configured
/// means the API is open.
pub async fn api_key_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let allowed = &state.config.config.server.api_keys;
    if allowed.is_empty() {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match api_key {
        Some(key) if allowed.contains(&key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(uri = %request.uri(), "invalid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
