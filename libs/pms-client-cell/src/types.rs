use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PmsPatient {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsSlot {
    pub appointment_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsAppointment {
    pub id: String,
}

/// The three entity kinds the sync service polls for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedEntityKind {
    Appointment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangedAppointment {
    pub id: String,
    pub practitioner_id: String,
    pub business_id: String,
    pub appointment_date: NaiveDate,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

impl ChangedAppointment {
    pub fn is_removed(&self) -> bool {
        self.deleted || self.cancelled_at.is_some()
    }
}

