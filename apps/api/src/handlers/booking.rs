use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use availability_cache_cell::AvailabilityCache;
use booking_cell::{BookRequest, BookingConfirmation, BookingTransactor, CancelRequest, RescheduleRequest};
use shared_models::AppError;

use crate::clinic;
use crate::handlers::error_response;
use crate::parsing::{parse_date_request, parse_time_request};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/appointment-handler", post(appointment_handler))
        .route("/cancel-appointment", post(cancel_appointment))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentHandlerRequest {
    action: String,
    session_id: String,
    dialed_number: String,
    caller_phone: String,
    #[serde(default)]
    patient_name: Option<String>,
    #[serde(default)]
    patient_phone: Option<String>,
    #[serde(default)]
    practitioner: Option<String>,
    #[serde(default)]
    appointment_type: Option<String>,
    #[serde(default)]
    appointment_date: Option<String>,
    #[serde(default)]
    appointment_time: Option<String>,
    #[serde(default)]
    business_id: Option<Uuid>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    appointment_id: Option<String>,
    #[serde(default)]
    new_date: Option<String>,
    #[serde(default)]
    new_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentHandlerResponse {
    success: bool,
    session_id: String,
    #[serde(rename = "appointmentId")]
    appointment_id: String,
    practitioner: String,
    service: String,
    duration_minutes: i32,
    local_date: String,
    local_time: String,
    location: String,
    message: String,
}

impl From<BookingConfirmation> for AppointmentHandlerResponse {
    fn from(confirmation: BookingConfirmation) -> Self {
        Self {
            success: true,
            session_id: String::new(),
            appointment_id: confirmation.appointment_id,
            practitioner: confirmation.practitioner_name,
            service: confirmation.service_name,
            duration_minutes: confirmation.duration_minutes,
            local_date: confirmation.local_date,
            local_time: confirmation.local_time,
            location: confirmation.location_name,
            message: confirmation.message,
        }
    }
}

async fn appointment_handler(
    State(state): State<AppState>,
    Json(req): Json<AppointmentHandlerRequest>,
) -> Response {
    match run_appointment(&state, &req).await {
        Ok(mut resp) => {
            resp.session_id = req.session_id.clone();
            Json(resp).into_response()
        }
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run_appointment(
    state: &AppState,
    req: &AppointmentHandlerRequest,
) -> Result<AppointmentHandlerResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;
    let transactor = build_transactor(state, &clinic);

    match req.action.as_str() {
        "book" => {
            let tz = shared_utils::resolve_timezone(&clinic.timezone, &state.config.default_timezone);
            let date_raw = req
                .appointment_date
                .as_deref()
                .ok_or_else(|| AppError::InvalidDate("missing".to_string()))?;
            let time_raw = req
                .appointment_time
                .as_deref()
                .ok_or_else(|| AppError::InvalidTime("missing".to_string()))?;

            let book_req = BookRequest {
                clinic_id: clinic.clinic_id,
                session_id: req.session_id.clone(),
                caller_phone: req.caller_phone.clone(),
                patient_phone: req.patient_phone.clone(),
                patient_name: req.patient_name.clone(),
                practitioner_query: req
                    .practitioner
                    .clone()
                    .ok_or_else(|| AppError::PractitionerNotFound("missing".to_string()))?,
                location_id: req
                    .business_id
                    .ok_or_else(|| AppError::LocationNotFound("missing".to_string()))?,
                service_query: req
                    .appointment_type
                    .clone()
                    .ok_or_else(|| AppError::ServiceNotFound {
                        practitioner: req.practitioner.clone().unwrap_or_default(),
                        service: "missing".to_string(),
                    })?,
                appointment_date: parse_date_request(date_raw, tz)?,
                appointment_time: parse_time_request(time_raw)?,
                notes: req.notes.clone(),
            };
            let confirmation = transactor.book(&book_req).await?;
            Ok(confirmation.into())
        }
        "reschedule" => {
            let tz = shared_utils::resolve_timezone(&clinic.timezone, &state.config.default_timezone);
            let date_raw = req
                .new_date
                .as_deref()
                .ok_or_else(|| AppError::InvalidDate("missing".to_string()))?;
            let time_raw = req
                .new_time
                .as_deref()
                .ok_or_else(|| AppError::InvalidTime("missing".to_string()))?;

            let reschedule_req = RescheduleRequest {
                clinic_id: clinic.clinic_id,
                session_id: req.session_id.clone(),
                appointment_id: req
                    .appointment_id
                    .clone()
                    .ok_or(AppError::AppointmentNotFound)?,
                new_practitioner_query: req.practitioner.clone(),
                new_service_query: req.appointment_type.clone(),
                new_date: parse_date_request(date_raw, tz)?,
                new_time: parse_time_request(time_raw)?,
                notes: req.notes.clone(),
            };
            let confirmation = transactor.reschedule(&reschedule_req).await?;
            Ok(confirmation.into())
        }
        "cancel" => {
            let cancel_req = CancelRequest {
                clinic_id: clinic.clinic_id,
                session_id: req.session_id.clone(),
                caller_phone: req.caller_phone.clone(),
                appointment_id: req.appointment_id.clone(),
                description: req.appointment_type.clone(),
            };
            let appointment_id = transactor.cancel(&cancel_req).await?;
            Ok(AppointmentHandlerResponse {
                success: true,
                session_id: String::new(),
                appointment_id,
                practitioner: String::new(),
                service: String::new(),
                duration_minutes: 0,
                local_date: String::new(),
                local_time: String::new(),
                location: String::new(),
                message: "Your appointment has been cancelled.".to_string(),
            })
        }
        other => Err(AppError::Internal(format!("unknown action '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelAppointmentRequest {
    #[serde(default)]
    appointment_id: Option<String>,
    #[serde(default)]
    appointment_details: Option<String>,
    session_id: String,
    dialed_number: String,
    caller_phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelAppointmentResponse {
    success: bool,
    session_id: String,
    appointment_id: String,
    message: String,
}

async fn cancel_appointment(
    State(state): State<AppState>,
    Json(req): Json<CancelAppointmentRequest>,
) -> Response {
    match run_cancel(&state, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run_cancel(
    state: &AppState,
    req: &CancelAppointmentRequest,
) -> Result<CancelAppointmentResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;
    let transactor = build_transactor(state, &clinic);

    let cancel_req = CancelRequest {
        clinic_id: clinic.clinic_id,
        session_id: req.session_id.clone(),
        caller_phone: req.caller_phone.clone(),
        appointment_id: req.appointment_id.clone(),
        description: req.appointment_details.clone(),
    };

    let appointment_id = transactor.cancel(&cancel_req).await?;

    Ok(CancelAppointmentResponse {
        success: true,
        session_id: req.session_id.clone(),
        appointment_id,
        message: "Your appointment has been cancelled.".to_string(),
    })
}

fn build_transactor(state: &AppState, clinic: &shared_models::Clinic) -> BookingTransactor {
    let pms = clinic::pms_client_for(clinic, state.rate_limiter.clone());
    let cache = Arc::new(AvailabilityCache::new(state.db.clone()));
    BookingTransactor::new(
        state.db.clone(),
        cache,
        pms,
        state.clinic_locks.clone(),
        state.fanout.clone(),
        state.config.default_timezone.clone(),
        state.config.booking_transaction_timeout,
    )
}
