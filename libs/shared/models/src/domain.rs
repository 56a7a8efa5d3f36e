//! Core entities from the data model: Clinic, Location, Practitioner,
//! Service, PractitionerSchedule, AvailabilitySlot, AvailabilityCacheEntry,
//! Appointment, Patient, SessionState, FailedBookingAttempt.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Clinic {
    pub clinic_id: Uuid,
    pub dialed_number: String,
    pub pms_api_key: String,
    pub pms_shard: String,
    pub timezone: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub location_id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationAlias {
    pub location_id: Uuid,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Practitioner {
    pub practitioner_id: Uuid,
    pub clinic_id: Uuid,
    pub given_name: String,
    pub family_name: String,
    pub title: Option<String>,
    pub active: bool,
}

impl Practitioner {
    pub fn full_name(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => {
                format!("{} {} {}", title, self.given_name, self.family_name)
            }
            _ => format!("{} {}", self.given_name, self.family_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub service_id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PractitionerSchedule {
    pub practitioner_id: Uuid,
    pub location_id: Uuid,
    pub day_of_week: i16,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
    pub earliest_time: Option<NaiveTime>,
    pub latest_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub practitioner_id: Uuid,
    pub location_id: Uuid,
    pub date: NaiveDate,
    pub appointment_start_utc: DateTime<Utc>,
    pub service_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityCacheEntry {
    pub practitioner_id: Uuid,
    pub location_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<AvailabilitySlot>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_stale: bool,
}

impl AvailabilityCacheEntry {
    /// Usable iff not stale and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_stale && self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Completed,
    NoShow,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub appointment_id: String,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub service_id: Uuid,
    pub location_id: Uuid,
    pub starts_at_utc: DateTime<Utc>,
    pub ends_at_utc: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub normalized_phone: String,
    pub given_name: String,
    pub family_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferredLocation {
    pub location_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub rejected_slot_instants: Vec<DateTime<Utc>>,
    pub last_criteria_fingerprint: Option<String>,
    pub preferred_location: Option<PreferredLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FailedBookingAttempt {
    pub practitioner_id: Uuid,
    pub location_id: Uuid,
    pub date: NaiveDate,
    pub time_of_day: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

/// Confidence tiers from the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    NoMatch,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceTier::High
        } else if score >= 0.5 {
            ConfidenceTier::Medium
        } else if score > 0.0 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_tiers_match_thresholds() {
        assert_eq!(ConfidenceTier::from_score(0.95), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.8), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.79), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.5), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.49), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(0.0), ConfidenceTier::NoMatch);
    }

    #[test]
    fn full_name_includes_title_when_present() {
        let p = Practitioner {
            practitioner_id: Uuid::nil(),
            clinic_id: Uuid::nil(),
            given_name: "Jane".to_string(),
            family_name: "Smith".to_string(),
            title: Some("Dr".to_string()),
            active: true,
        };
        assert_eq!(p.full_name(), "Dr Jane Smith");
    }

    #[test]
    fn cache_entry_usable_only_when_fresh_and_not_stale() {
        let now = Utc::now();
        let entry = AvailabilityCacheEntry {
            practitioner_id: Uuid::nil(),
            location_id: Uuid::nil(),
            date: now.date_naive(),
            slots: vec![],
            cached_at: now,
            expires_at: now + chrono::Duration::minutes(15),
            is_stale: false,
        };
        assert!(entry.is_usable(now));
        let mut stale = entry.clone();
        stale.is_stale = true;
        assert!(!stale.is_usable(now));
        let mut expired = entry;
        expired.expires_at = now - chrono::Duration::seconds(1);
        assert!(!expired.is_usable(now));
    }
}
