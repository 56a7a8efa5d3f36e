use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use resolver_cell::{Candidate, LocationResolver, Resolution};
use shared_models::AppError;

use crate::clinic;
use crate::handlers::error_response;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/location-resolver", post(location_resolver))
        .route("/confirm-location", post(confirm_location))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationResolverRequest {
    location_query: String,
    session_id: String,
    dialed_number: String,
    #[serde(default)]
    caller_phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct LocationOption {
    name: String,
    #[serde(rename = "locationId")]
    location_id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationResolverResponse {
    success: bool,
    session_id: String,
    resolved: bool,
    needs_clarification: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<LocationOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Vec<LocationOption>>,
    confidence: &'static str,
}

async fn location_resolver(
    State(state): State<AppState>,
    Json(req): Json<LocationResolverRequest>,
) -> Response {
    match run_resolver(&state, &req.dialed_number, &req.location_query, req.caller_phone.as_deref()).await {
        Ok(resolution) => Json(to_response(req.session_id, resolution)).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmLocationRequest {
    user_response: String,
    options: Vec<LocationOptionIn>,
    session_id: String,
    dialed_number: String,
}

#[derive(Debug, Deserialize)]
struct LocationOptionIn {
    name: String,
    #[serde(rename = "locationId")]
    location_id: uuid::Uuid,
}

async fn confirm_location(
    State(state): State<AppState>,
    Json(req): Json<ConfirmLocationRequest>,
) -> Response {
    let normalized_reply = shared_utils::normalize_for_matching(&req.user_response);

    let matched = req
        .options
        .iter()
        .find(|opt| shared_utils::normalize_for_matching(&opt.name) == normalized_reply)
        .or_else(|| {
            req.options
                .iter()
                .find(|opt| shared_utils::normalize_for_matching(&opt.name).contains(&normalized_reply))
        });

    let Some(matched) = matched else {
        return Json(LocationResolverResponse {
            success: true,
            session_id: req.session_id,
            resolved: false,
            needs_clarification: true,
            message: "I'm not sure which of those you meant. Could you say the location name again?"
                .to_string(),
            location: None,
            options: Some(
                req.options
                    .into_iter()
                    .map(|opt| LocationOption {
                        name: opt.name,
                        location_id: opt.location_id,
                    })
                    .collect(),
            ),
            confidence: "low",
        })
        .into_response();
    };

    match run_resolver(&state, &req.dialed_number, &matched.name, None).await {
        Ok(resolution) => Json(to_response(req.session_id, resolution)).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run_resolver(
    state: &AppState,
    dialed_number: &str,
    query: &str,
    caller_phone: Option<&str>,
) -> Result<Resolution, AppError> {
    let clinic = clinic::load_clinic(&state.db, dialed_number).await?;
    let resolver = LocationResolver::new(state.db.clone());
    resolver.resolve(clinic.clinic_id, query, caller_phone).await
}

fn to_response(session_id: String, resolution: Resolution) -> LocationResolverResponse {
    match resolution {
        Resolution::Resolved(candidate) => LocationResolverResponse {
            success: true,
            session_id,
            resolved: true,
            needs_clarification: false,
            message: format!("Got it, {}.", candidate.name),
            location: Some(candidate_to_option(candidate)),
            options: None,
            confidence: "high",
        },
        Resolution::Confirm(candidate) => LocationResolverResponse {
            success: true,
            session_id,
            resolved: false,
            needs_clarification: true,
            message: format!("Did you mean {}?", candidate.name),
            location: Some(candidate_to_option(candidate)),
            options: None,
            confidence: "medium",
        },
        Resolution::Clarify(candidates) => LocationResolverResponse {
            success: true,
            session_id,
            resolved: false,
            needs_clarification: true,
            message: "Which location did you mean?".to_string(),
            location: None,
            options: Some(candidates.into_iter().map(candidate_to_option).collect()),
            confidence: "low",
        },
        Resolution::NoMatch => LocationResolverResponse {
            success: true,
            session_id,
            resolved: false,
            needs_clarification: false,
            message: "I couldn't find a location matching that.".to_string(),
            location: None,
            options: None,
            confidence: "none",
        },
    }
}

fn candidate_to_option(candidate: Candidate) -> LocationOption {
    LocationOption {
        name: candidate.name,
        location_id: candidate.id,
    }
}
