//! Shared API key auth: development mode allows a missing key, generalized
//! from the teacher's per-request JWT check into a single shared-secret
//! comparison against `X-API-Key`.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.is_development() {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if !state.config.api_key.is_empty() && key == state.config.api_key => {
            Ok(next.run(request).await)
        }
        _ => {
            warn!("rejected request with missing or invalid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
