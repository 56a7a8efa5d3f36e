use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use availability_cache_cell::AvailabilityCache;
use availability_search_cell::{AvailabilitySearch, SearchCriteria, SearchOutcome};
use resolver_cell::{PractitionerResolver, Resolution, ServiceResolver};
use schedule_oracle_cell::ScheduleOracle;
use session_cell::SessionStore;
use shared_models::AppError;

use crate::clinic;
use crate::handlers::error_response;
use crate::parsing::parse_date_request;
use crate::state::AppState;

const FALLBACK_HORIZON_DAYS: i64 = 14;
const DEFAULT_MAX_DAYS: i64 = 14;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/availability-checker", post(availability_checker))
        .route("/find-next-available", post(find_next_available))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityCheckerRequest {
    practitioner: String,
    appointment_type: String,
    date: String,
    session_id: String,
    dialed_number: String,
    #[serde(default)]
    location_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct SlotDto {
    #[serde(rename = "startTimeUtc")]
    start_time_utc: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "localDate")]
    local_date: String,
    #[serde(rename = "localTime")]
    local_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityCheckerResponse {
    success: bool,
    session_id: String,
    slots: Vec<SlotDto>,
    summary: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_horizon_days: Option<i64>,
}

async fn availability_checker(
    State(state): State<AppState>,
    Json(req): Json<AvailabilityCheckerRequest>,
) -> Response {
    match run_checker(&state, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run_checker(
    state: &AppState,
    req: &AvailabilityCheckerRequest,
) -> Result<AvailabilityCheckerResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;

    let practitioner_resolver = PractitionerResolver::new(state.db.clone());
    let practitioner = resolve_single_practitioner(&practitioner_resolver, clinic.clinic_id, &req.practitioner).await?;

    let service_resolver = ServiceResolver::new(state.db.clone());
    let service = service_resolver
        .resolve(practitioner.id, &req.appointment_type)
        .await?
        .ok_or_else(|| AppError::ServiceNotFound {
            practitioner: practitioner.name.clone(),
            service: req.appointment_type.clone(),
        })?;

    let location_ids = match req.location_id {
        Some(id) => vec![id],
        None => practitioner_location_ids(&state.db, practitioner.id).await?,
    };

    let tz = shared_utils::resolve_timezone(&clinic.timezone, &state.config.default_timezone);
    let date = parse_date_request(&req.date, tz)?;

    let pms = clinic::pms_client_for(&clinic, state.rate_limiter.clone());
    let search = build_search(state, pms);

    let location_id = *location_ids
        .first()
        .ok_or_else(|| AppError::PractitionerLocationMismatch {
            practitioner: practitioner.name.clone(),
            actual_locations: vec![],
        })?;

    let slots = search
        .check_day(clinic.clinic_id, practitioner.id, location_id, service.id, date)
        .await?;

    if !slots.is_empty() {
        let slot_dtos: Vec<SlotDto> = slots
            .iter()
            .map(|slot| SlotDto {
                start_time_utc: slot.appointment_start_utc,
                local_date: shared_utils::format_date_for_voice(slot.appointment_start_utc, tz),
                local_time: shared_utils::format_time_for_voice(slot.appointment_start_utc, tz),
            })
            .collect();
        let summary = format!("{} has {} opening(s) on that day.", practitioner.name, slot_dtos.len());
        let message = format!(
            "{} is available at {} on {}.",
            practitioner.name, slot_dtos[0].local_time, slot_dtos[0].local_date
        );
        return Ok(AvailabilityCheckerResponse {
            success: true,
            session_id: req.session_id.clone(),
            slots: slot_dtos,
            summary,
            message,
            fallback_horizon_days: None,
        });
    }

    let criteria = SearchCriteria {
        clinic_id: clinic.clinic_id,
        practitioner_ids: vec![practitioner.id],
        practitioner_name: practitioner.name.clone(),
        location_ids,
        service_id: service.id,
        service_name: service.name.clone(),
        preferred_location_id: req.location_id,
    };

    let outcome = search
        .find_next_available(&criteria, FALLBACK_HORIZON_DAYS, &req.session_id)
        .await?;

    match outcome {
        SearchOutcome::Found { slots, message } => {
            let slot_dtos: Vec<SlotDto> = slots
                .iter()
                .map(|slot| SlotDto {
                    start_time_utc: slot.appointment_start_utc,
                    local_date: slot.local_date.clone(),
                    local_time: slot.local_time.clone(),
                })
                .collect();
            Ok(AvailabilityCheckerResponse {
                success: true,
                session_id: req.session_id.clone(),
                summary: format!("No openings that day; next availability within {FALLBACK_HORIZON_DAYS} days."),
                slots: slot_dtos,
                message,
                fallback_horizon_days: Some(FALLBACK_HORIZON_DAYS),
            })
        }
        SearchOutcome::NoAvailability { horizon_days } => Ok(AvailabilityCheckerResponse {
            success: true,
            session_id: req.session_id.clone(),
            slots: vec![],
            summary: "No availability found.".to_string(),
            message: format!(
                "I couldn't find any availability for {} in the next {horizon_days} days.",
                practitioner.name
            ),
            fallback_horizon_days: Some(horizon_days),
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindNextAvailableRequest {
    #[serde(default)]
    practitioner: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    location_id: Option<Uuid>,
    #[serde(default)]
    max_days: Option<i64>,
    session_id: String,
    dialed_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindNextAvailableResponse {
    success: bool,
    session_id: String,
    slots: Vec<SlotDto>,
    message: String,
}

async fn find_next_available(
    State(state): State<AppState>,
    Json(req): Json<FindNextAvailableRequest>,
) -> Response {
    match run_find_next(&state, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run_find_next(
    state: &AppState,
    req: &FindNextAvailableRequest,
) -> Result<FindNextAvailableResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;

    let practitioner_resolver = PractitionerResolver::new(state.db.clone());
    let practitioner = match &req.practitioner {
        Some(query) => resolve_single_practitioner(&practitioner_resolver, clinic.clinic_id, query).await?,
        None => {
            return Err(AppError::PractitionerNotFound(
                "no practitioner specified".to_string(),
            ))
        }
    };

    let service_resolver = ServiceResolver::new(state.db.clone());
    let service = match &req.service {
        Some(query) => service_resolver
            .resolve(practitioner.id, query)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound {
                practitioner: practitioner.name.clone(),
                service: query.clone(),
            })?,
        None => first_active_service(&state.db, practitioner.id).await?,
    };

    let location_ids = match req.location_id {
        Some(id) => vec![id],
        None => practitioner_location_ids(&state.db, practitioner.id).await?,
    };

    let criteria = SearchCriteria {
        clinic_id: clinic.clinic_id,
        practitioner_ids: vec![practitioner.id],
        practitioner_name: practitioner.name.clone(),
        location_ids,
        service_id: service.id,
        service_name: service.name.clone(),
        preferred_location_id: req.location_id,
    };

    let pms = clinic::pms_client_for(&clinic, state.rate_limiter.clone());
    let search = build_search(state, pms);

    let horizon = req.max_days.unwrap_or(DEFAULT_MAX_DAYS);
    let outcome = search.find_next_available(&criteria, horizon, &req.session_id).await?;

    match outcome {
        SearchOutcome::Found { slots, message } => Ok(FindNextAvailableResponse {
            success: true,
            session_id: req.session_id.clone(),
            slots: slots
                .iter()
                .map(|slot| SlotDto {
                    start_time_utc: slot.appointment_start_utc,
                    local_date: slot.local_date.clone(),
                    local_time: slot.local_time.clone(),
                })
                .collect(),
            message,
        }),
        SearchOutcome::NoAvailability { horizon_days } => Ok(FindNextAvailableResponse {
            success: true,
            session_id: req.session_id.clone(),
            slots: vec![],
            message: format!("I couldn't find any availability in the next {horizon_days} days."),
        }),
    }
}

async fn resolve_single_practitioner(
    resolver: &PractitionerResolver,
    clinic_id: Uuid,
    query: &str,
) -> Result<resolver_cell::Candidate, AppError> {
    match resolver.resolve(clinic_id, query).await? {
        Resolution::Resolved(candidate) | Resolution::Confirm(candidate) => Ok(candidate),
        Resolution::Clarify(mut candidates) if !candidates.is_empty() => Ok(candidates.remove(0)),
        _ => Err(AppError::PractitionerNotFound(query.to_string())),
    }
}

async fn practitioner_location_ids(
    db: &shared_database::Database,
    practitioner_id: Uuid,
) -> Result<Vec<Uuid>, AppError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT location_id FROM practitioner_locations WHERE practitioner_id = $1",
    )
    .bind(practitioner_id)
    .fetch_all(db.pool())
    .await?;
    Ok(ids)
}

async fn first_active_service(
    db: &shared_database::Database,
    practitioner_id: Uuid,
) -> Result<resolver_cell::Candidate, AppError> {
    let row = sqlx::query(
        "SELECT s.service_id, s.name FROM services s \
         JOIN practitioner_services ps ON ps.service_id = s.service_id \
         WHERE ps.practitioner_id = $1 AND s.active = true \
         ORDER BY s.name LIMIT 1",
    )
    .bind(practitioner_id)
    .fetch_optional(db.pool())
    .await?;

    let Some(row) = row else {
        return Err(AppError::ServiceNotFound {
            practitioner: practitioner_id.to_string(),
            service: "any".to_string(),
        });
    };

    Ok(resolver_cell::Candidate {
        id: row.try_get("service_id")?,
        name: row.try_get("name")?,
        score: 1.0,
    })
}

fn build_search(state: &AppState, pms: Arc<pms_client_cell::PmsClient>) -> AvailabilitySearch {
    AvailabilitySearch::new(
        state.db.clone(),
        Arc::new(AvailabilityCache::new(state.db.clone())),
        pms,
        Arc::new(ScheduleOracle::new(state.db.clone())),
        Arc::new(SessionStore::new(state.db.clone())),
        state.fanout.clone(),
        state.config.default_timezone.clone(),
    )
}
