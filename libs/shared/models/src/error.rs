use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

/// The full error taxonomy from the error-handling design: every kind the
/// system can surface, never a bare string.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I couldn't find the clinic information.")]
    ClinicNotFound,

    #[error("That doesn't look like a valid phone number.")]
    InvalidPhoneNumber(String),

    #[error("I didn't understand that date.")]
    InvalidDate(String),

    #[error("I didn't understand that time.")]
    InvalidTime(String),

    #[error("I couldn't find that location.")]
    LocationNotFound(String),

    #[error("I couldn't find a practitioner named '{0}'.")]
    PractitionerNotFound(String),

    #[error("{0} isn't taking bookings at the moment.")]
    PractitionerInactive(String),

    #[error("{practitioner} doesn't work at that location.")]
    PractitionerLocationMismatch {
        practitioner: String,
        actual_locations: Vec<String>,
    },

    #[error("{practitioner} doesn't offer {service}.")]
    ServiceNotFound { practitioner: String, service: String },

    #[error("I couldn't find any availability in the next {0} days.")]
    NoAvailability(i64),

    #[error("That time isn't available.")]
    TimeNotAvailable { alternatives: Vec<String> },

    #[error("That time was just taken by someone else.")]
    TimeJustTaken,

    #[error("It looks like you already have an appointment at that time.")]
    DuplicateBooking,

    #[error("I couldn't find that appointment.")]
    AppointmentNotFound,

    #[error("I wasn't able to cancel that appointment: {0}")]
    CancellationFailed(String),

    #[error("I'm having trouble reaching the booking system right now.")]
    UpstreamUnauthorized,

    #[error("The booking system isn't responding right now. Please try again shortly.")]
    UpstreamUnavailable,

    #[error("Something went wrong on our end. Please try again.")]
    Database(String),

    #[error("Something went wrong on our end. Please try again.")]
    Internal(String),
}

impl AppError {
    /// Machine-facing error code (the `error` field of every response).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ClinicNotFound => "clinic_not_found",
            AppError::InvalidPhoneNumber(_) => "invalid_phone_number",
            AppError::InvalidDate(_) => "invalid_date",
            AppError::InvalidTime(_) => "invalid_time",
            AppError::LocationNotFound(_) => "location_not_found",
            AppError::PractitionerNotFound(_) => "practitioner_not_found",
            AppError::PractitionerInactive(_) => "practitioner_inactive",
            AppError::PractitionerLocationMismatch { .. } => "practitioner_location_mismatch",
            AppError::ServiceNotFound { .. } => "service_not_found",
            AppError::NoAvailability(_) => "no_availability",
            AppError::TimeNotAvailable { .. } => "time_not_available",
            AppError::TimeJustTaken => "time_just_taken",
            AppError::DuplicateBooking => "duplicate_booking",
            AppError::AppointmentNotFound => "appointment_not_found",
            AppError::CancellationFailed(_) => "cancellation_failed",
            AppError::UpstreamUnauthorized => "upstream_unauthorized",
            AppError::UpstreamUnavailable => "upstream_unavailable",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ClinicNotFound
            | AppError::LocationNotFound(_)
            | AppError::PractitionerNotFound(_)
            | AppError::AppointmentNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidPhoneNumber(_)
            | AppError::InvalidDate(_)
            | AppError::InvalidTime(_)
            | AppError::PractitionerInactive(_)
            | AppError::PractitionerLocationMismatch { .. }
            | AppError::ServiceNotFound { .. }
            | AppError::NoAvailability(_)
            | AppError::TimeNotAvailable { .. } => StatusCode::BAD_REQUEST,
            AppError::TimeJustTaken | AppError::DuplicateBooking => StatusCode::CONFLICT,
            AppError::CancellationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnauthorized => StatusCode::BAD_GATEWAY,
            AppError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Remediation hint surfaced alongside the spoken message.
    pub fn remediation(&self) -> Option<String> {
        match self {
            AppError::PractitionerLocationMismatch {
                actual_locations, ..
            } => Some(format!(
                "They see patients at: {}.",
                actual_locations.join(", ")
            )),
            AppError::TimeNotAvailable { alternatives } if !alternatives.is_empty() => {
                Some(format!("How about: {}?", alternatives.join(", ")))
            }
            _ => None,
        }
    }

    pub fn envelope(&self, session_id: &str) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            session_id: session_id.to_string(),
            error: self.code().to_string(),
            message: self.to_string(),
            remediation: self.remediation(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(code = self.code(), "request failed: {}", self);
        let body = Json(self.envelope("unknown"));
        (self.status_code(), body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable.with_detail(err.to_string())
    }
}

impl AppError {
    /// Attaches extra detail for logging while keeping the spoken-style
    /// message intact (the `Display` impl ignores this).
    fn with_detail(self, detail: String) -> Self {
        tracing::debug!("error detail: {}", detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_distinct_code() {
        let codes = [
            AppError::ClinicNotFound.code(),
            AppError::InvalidPhoneNumber(String::new()).code(),
            AppError::InvalidDate(String::new()).code(),
            AppError::InvalidTime(String::new()).code(),
            AppError::LocationNotFound(String::new()).code(),
            AppError::PractitionerNotFound(String::new()).code(),
            AppError::PractitionerInactive(String::new()).code(),
            AppError::PractitionerLocationMismatch {
                practitioner: String::new(),
                actual_locations: vec![],
            }
            .code(),
            AppError::ServiceNotFound {
                practitioner: String::new(),
                service: String::new(),
            }
            .code(),
            AppError::NoAvailability(0).code(),
            AppError::TimeNotAvailable { alternatives: vec![] }.code(),
            AppError::TimeJustTaken.code(),
            AppError::DuplicateBooking.code(),
            AppError::AppointmentNotFound.code(),
            AppError::CancellationFailed(String::new()).code(),
            AppError::UpstreamUnauthorized.code(),
            AppError::UpstreamUnavailable.code(),
            AppError::Database(String::new()).code(),
            AppError::Internal(String::new()).code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn practitioner_location_mismatch_carries_remediation() {
        let err = AppError::PractitionerLocationMismatch {
            practitioner: "Dr. Doe".to_string(),
            actual_locations: vec!["Suburb Clinic".to_string()],
        };
        let envelope = err.envelope("sess-1");
        assert_eq!(envelope.error, "practitioner_location_mismatch");
        assert!(envelope.remediation.unwrap().contains("Suburb Clinic"));
    }

    #[test]
    fn conflict_kinds_map_to_409() {
        assert_eq!(AppError::TimeJustTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::DuplicateBooking.status_code(), StatusCode::CONFLICT);
    }
}
