use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The cross-product input to `find_next_available`: every candidate
/// practitioner/location pulled from resolution, and the one service the
/// caller asked for (service resolution is strict — never a list).
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub clinic_id: Uuid,
    pub practitioner_ids: Vec<Uuid>,
    pub practitioner_name: String,
    pub location_ids: Vec<Uuid>,
    pub service_id: Uuid,
    pub service_name: String,
    pub preferred_location_id: Option<Uuid>,
}

impl SearchCriteria {
    /// Stable hash of the normalized triple — a change clears the
    /// session's rejected-slot set.
    pub fn fingerprint(&self) -> String {
        let mut practitioners: Vec<String> =
            self.practitioner_ids.iter().map(Uuid::to_string).collect();
        practitioners.sort();
        let mut locations: Vec<String> = self.location_ids.iter().map(Uuid::to_string).collect();
        locations.sort();

        shared_utils::criteria_fingerprint(&[
            &practitioners.join(","),
            &locations.join(","),
            &self.service_id.to_string(),
        ])
    }
}

/// One slot offered back to the caller, already localized for speech.
#[derive(Debug, Clone)]
pub struct OfferedSlot {
    pub appointment_start_utc: DateTime<Utc>,
    pub practitioner_id: Uuid,
    pub location_id: Uuid,
    pub service_id: Uuid,
    pub local_date: String,
    pub local_time: String,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found {
        slots: Vec<OfferedSlot>,
        message: String,
    },
    NoAvailability {
        horizon_days: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(practitioner_ids: Vec<Uuid>, location_ids: Vec<Uuid>) -> SearchCriteria {
        SearchCriteria {
            clinic_id: Uuid::nil(),
            practitioner_ids,
            practitioner_name: "Dr Smith".to_string(),
            location_ids,
            service_id: Uuid::nil(),
            service_name: "Consult".to_string(),
            preferred_location_id: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_under_reordering() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let loc = Uuid::new_v4();

        let first = criteria(vec![a, b], vec![loc]);
        let second = criteria(vec![b, a], vec![loc]);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_when_service_changes() {
        let a = Uuid::new_v4();
        let loc = Uuid::new_v4();

        let mut first = criteria(vec![a], vec![loc]);
        let mut second = criteria(vec![a], vec![loc]);
        first.service_id = Uuid::new_v4();
        second.service_id = Uuid::new_v4();

        assert_ne!(first.fingerprint(), second.fingerprint());
    }
}
