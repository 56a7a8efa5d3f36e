use axum::routing::get;
use axum::{middleware, Router};

use crate::auth::require_api_key;
use crate::handlers::{availability, booking, location, practitioner, sync};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Voice booking API is running!" }))
        .merge(sync::routes(state.clone()))
        .merge(location::routes(state.clone()))
        .merge(practitioner::routes(state.clone()))
        .merge(availability::routes(state.clone()))
        .merge(booking::routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, require_api_key))
}
