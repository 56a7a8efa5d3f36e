use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

/// Input to [`crate::BookingTransactor::book`]. Practitioner and service are
/// still free text — fuzzy resolution happens inside the booking flow —
/// but `location_id` arrives already resolved, mirroring how a caller's
/// location is pinned down in an earlier turn (the transactor only
/// re-validates the join, it doesn't re-resolve the location).
#[derive(Debug, Clone)]
pub struct BookRequest {
    pub clinic_id: Uuid,
    pub session_id: String,
    pub caller_phone: String,
    pub patient_phone: Option<String>,
    pub patient_name: Option<String>,
    pub practitioner_query: String,
    pub location_id: Uuid,
    pub service_query: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    pub clinic_id: Uuid,
    pub session_id: String,
    pub appointment_id: String,
    pub new_practitioner_query: Option<String>,
    pub new_service_query: Option<String>,
    pub new_date: NaiveDate,
    pub new_time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub clinic_id: Uuid,
    pub session_id: String,
    pub caller_phone: String,
    pub appointment_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub appointment_id: String,
    pub practitioner_name: String,
    pub service_name: String,
    pub duration_minutes: i32,
    pub local_date: String,
    pub local_time: String,
    pub location_name: String,
    pub message: String,
}
