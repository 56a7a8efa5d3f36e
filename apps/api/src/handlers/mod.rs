//! One module per endpoint family, each exposing a `routes(state)` that
//! builds its slice of the router. `error_response` is the one place an
//! `AppError` is turned into a body, so the envelope always carries the
//! caller's real session id instead of the `AppError::IntoResponse` default.

pub mod availability;
pub mod booking;
pub mod location;
pub mod practitioner;
pub mod sync;

use axum::response::{IntoResponse, Response};
use axum::Json;
use shared_models::AppError;

pub fn error_response(session_id: &str, err: AppError) -> Response {
    tracing::error!(code = err.code(), session_id, "request failed: {}", err);
    (err.status_code(), Json(err.envelope(session_id))).into_response()
}
