use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use availability_cache_cell::AvailabilityCache;
use fanout_cell::{FanoutEngine, FanoutTask, TaskError};
use pms_client_cell::{PmsClient, PmsError};
use schedule_oracle_cell::ScheduleOracle;
use session_cell::SessionStore;
use shared_database::Database;
use shared_models::{AppError, AvailabilitySlot};

use crate::types::{OfferedSlot, SearchCriteria, SearchOutcome};

/// A practitioner/location/service triple already validated against the
/// `PractitionerLocation`/`PractitionerService` joins.
#[derive(Debug, Clone, Copy)]
struct Triple {
    practitioner_id: Uuid,
    location_id: Uuid,
}

/// A slot found for a single (practitioner, location, date) check, before
/// dedup/sort/tie-break aggregation.
#[derive(Debug, Clone)]
struct RawSlot {
    appointment_start_utc: chrono::DateTime<Utc>,
    practitioner_id: Uuid,
    location_id: Uuid,
    is_primary_location: bool,
}

/// Drives the fan-out search across every validated practitioner/location
/// pair and the enumerated date window, consulting the cache, the schedule
/// oracle's pruning index, and the session's rejected-slot set.
pub struct AvailabilitySearch {
    db: Database,
    cache: Arc<AvailabilityCache>,
    pms: Arc<PmsClient>,
    oracle: Arc<ScheduleOracle>,
    sessions: Arc<SessionStore>,
    fanout: Arc<FanoutEngine>,
    default_timezone: String,
}

impl AvailabilitySearch {
    pub fn new(
        db: Database,
        cache: Arc<AvailabilityCache>,
        pms: Arc<PmsClient>,
        oracle: Arc<ScheduleOracle>,
        sessions: Arc<SessionStore>,
        fanout: Arc<FanoutEngine>,
        default_timezone: String,
    ) -> Self {
        Self {
            db,
            cache,
            pms,
            oracle,
            sessions,
            fanout,
            default_timezone,
        }
    }

    pub async fn find_next_available(
        &self,
        criteria: &SearchCriteria,
        horizon_days: i64,
        session_id: &str,
    ) -> Result<SearchOutcome, AppError> {
        let triples = self.validate_triples(criteria).await?;

        let session = self
            .sessions
            .reset_if_fingerprint_changed(session_id, &criteria.fingerprint())
            .await?;

        let today = Utc::now().date_naive();
        let all_dates: Vec<NaiveDate> = (0..horizon_days)
            .map(|i| today + ChronoDuration::days(i))
            .collect();

        let mut tasks = Vec::new();
        for triple in &triples {
            let pruned = self
                .oracle
                .scheduled_days(triple.practitioner_id, triple.location_id, &all_dates)
                .await?;
            for date in pruned {
                tasks.push(self.build_task(criteria.clinic_id, *triple, criteria.service_id, date));
            }
        }

        if tasks.is_empty() {
            return Ok(SearchOutcome::NoAvailability { horizon_days });
        }

        let outcomes = self.fanout.execute(tasks, None).await;

        let locations_primary = self.primary_flags(&criteria.location_ids).await?;

        let mut raw_slots = Vec::new();
        for outcome in outcomes {
            if let Ok(slots) = outcome.result {
                raw_slots.extend(slots);
            }
        }

        let suppressed = self.suppressed_times(&triples).await?;
        let rejected: HashSet<_> = session.rejected_slot_instants.iter().copied().collect();

        let tz_name = self.clinic_timezone(criteria.clinic_id).await?;
        let tz = shared_utils::resolve_timezone(&tz_name, &self.default_timezone);

        let mut deduped: Vec<RawSlot> = Vec::new();
        let mut seen = HashSet::new();
        for slot in raw_slots {
            let key = (
                slot.appointment_start_utc,
                slot.practitioner_id,
                slot.location_id,
            );
            if !seen.insert(key) {
                continue;
            }
            if rejected.contains(&slot.appointment_start_utc) {
                continue;
            }
            let local_time = slot.appointment_start_utc.with_timezone(&tz).time();
            if suppressed.contains(&(
                slot.practitioner_id,
                slot.location_id,
                slot.appointment_start_utc.date_naive(),
                local_time,
            )) {
                continue;
            }
            deduped.push(RawSlot {
                appointment_start_utc: slot.appointment_start_utc,
                practitioner_id: slot.practitioner_id,
                location_id: slot.location_id,
                is_primary_location: locations_primary
                    .get(&slot.location_id)
                    .copied()
                    .unwrap_or(false),
            });
        }

        deduped.sort_by(|a, b| {
            a.appointment_start_utc
                .cmp(&b.appointment_start_utc)
                .then_with(|| {
                    let a_preferred = criteria.preferred_location_id == Some(a.location_id);
                    let b_preferred = criteria.preferred_location_id == Some(b.location_id);
                    b_preferred.cmp(&a_preferred)
                })
                .then_with(|| b.is_primary_location.cmp(&a.is_primary_location))
                .then_with(|| a.practitioner_id.cmp(&b.practitioner_id))
        });

        if deduped.is_empty() {
            return Ok(SearchOutcome::NoAvailability { horizon_days });
        }

        let selected: Vec<OfferedSlot> = deduped
            .into_iter()
            .take(2)
            .map(|slot| OfferedSlot {
                appointment_start_utc: slot.appointment_start_utc,
                practitioner_id: slot.practitioner_id,
                location_id: slot.location_id,
                service_id: criteria.service_id,
                local_date: shared_utils::format_date_for_voice(slot.appointment_start_utc, tz),
                local_time: shared_utils::format_time_for_voice(slot.appointment_start_utc, tz),
            })
            .collect();

        let message = compose_message(&criteria.practitioner_name, &criteria.service_name, &selected);

        Ok(SearchOutcome::Found {
            slots: selected,
            message,
        })
    }

    /// Single-day variant reusing the same cache/client path.
    pub async fn check_day(
        &self,
        clinic_id: Uuid,
        practitioner_id: Uuid,
        location_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, AppError> {
        self.check_single(clinic_id, practitioner_id, location_id, service_id, date)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    fn build_task(
        &self,
        clinic_id: Uuid,
        triple: Triple,
        service_id: Uuid,
        date: NaiveDate,
    ) -> FanoutTask<impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<RawSlot>, TaskError>> + Send>>>
    {
        let cache = self.cache.clone();
        let pms = self.pms.clone();
        let practitioner_id = triple.practitioner_id;
        let location_id = triple.location_id;

        FanoutTask::new(move || {
            let cache = cache.clone();
            let pms = pms.clone();
            Box::pin(async move {
                let slots = check_single_inner(
                    &cache, &pms, clinic_id, practitioner_id, location_id, service_id, date,
                )
                .await
                .map_err(classify)?;
                Ok(slots
                    .into_iter()
                    .map(|slot| RawSlot {
                        appointment_start_utc: slot.appointment_start_utc,
                        practitioner_id,
                        location_id,
                        is_primary_location: false,
                    })
                    .collect())
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<RawSlot>, TaskError>> + Send>>
        })
    }

    async fn check_single(
        &self,
        clinic_id: Uuid,
        practitioner_id: Uuid,
        location_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, PmsError> {
        check_single_inner(
            &self.cache,
            &self.pms,
            clinic_id,
            practitioner_id,
            location_id,
            service_id,
            date,
        )
        .await
    }

    async fn validate_triples(&self, criteria: &SearchCriteria) -> Result<Vec<Triple>, AppError> {
        if criteria.practitioner_ids.is_empty() || criteria.location_ids.is_empty() {
            return Err(AppError::PractitionerNotFound(
                criteria.practitioner_name.clone(),
            ));
        }

        let rows = sqlx::query(
            "SELECT pl.practitioner_id, pl.location_id \
             FROM practitioner_locations pl \
             JOIN practitioner_services ps ON ps.practitioner_id = pl.practitioner_id \
             WHERE pl.practitioner_id = ANY($1) AND pl.location_id = ANY($2) \
               AND ps.service_id = $3",
        )
        .bind(&criteria.practitioner_ids)
        .bind(&criteria.location_ids)
        .bind(criteria.service_id)
        .fetch_all(self.db.pool())
        .await?;

        if !rows.is_empty() {
            let mut triples = Vec::with_capacity(rows.len());
            for row in rows {
                triples.push(Triple {
                    practitioner_id: row.try_get("practitioner_id")?,
                    location_id: row.try_get("location_id")?,
                });
            }
            return Ok(triples);
        }

        let worked_locations: Vec<Uuid> = sqlx::query_scalar(
            "SELECT location_id FROM practitioner_locations WHERE practitioner_id = ANY($1)",
        )
        .bind(&criteria.practitioner_ids)
        .fetch_all(self.db.pool())
        .await?;

        let overlaps_requested_location = worked_locations
            .iter()
            .any(|l| criteria.location_ids.contains(l));

        if !overlaps_requested_location {
            let actual_locations: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT l.name FROM practitioner_locations pl \
                 JOIN locations l ON l.location_id = pl.location_id \
                 WHERE pl.practitioner_id = ANY($1)",
            )
            .bind(&criteria.practitioner_ids)
            .fetch_all(self.db.pool())
            .await?;

            return Err(AppError::PractitionerLocationMismatch {
                practitioner: criteria.practitioner_name.clone(),
                actual_locations,
            });
        }

        Err(AppError::ServiceNotFound {
            practitioner: criteria.practitioner_name.clone(),
            service: criteria.service_name.clone(),
        })
    }

    async fn primary_flags(
        &self,
        location_ids: &[Uuid],
    ) -> Result<std::collections::HashMap<Uuid, bool>, AppError> {
        let rows = sqlx::query("SELECT location_id, is_primary FROM locations WHERE location_id = ANY($1)")
            .bind(location_ids)
            .fetch_all(self.db.pool())
            .await?;
        let mut map = std::collections::HashMap::new();
        for row in rows {
            map.insert(row.try_get("location_id")?, row.try_get("is_primary")?);
        }
        Ok(map)
    }

    async fn suppressed_times(
        &self,
        triples: &[Triple],
    ) -> Result<HashSet<(Uuid, Uuid, NaiveDate, chrono::NaiveTime)>, AppError> {
        let practitioner_ids: Vec<Uuid> = triples.iter().map(|t| t.practitioner_id).collect();
        let location_ids: Vec<Uuid> = triples.iter().map(|t| t.location_id).collect();
        let cutoff = Utc::now() - ChronoDuration::seconds(7200);

        let rows = sqlx::query(
            "SELECT practitioner_id, location_id, date, time_of_day FROM failed_booking_attempts \
             WHERE practitioner_id = ANY($1) AND location_id = ANY($2) AND created_at > $3",
        )
        .bind(&practitioner_ids)
        .bind(&location_ids)
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await?;

        let mut set = HashSet::new();
        for row in rows {
            set.insert((
                row.try_get("practitioner_id")?,
                row.try_get("location_id")?,
                row.try_get("date")?,
                row.try_get("time_of_day")?,
            ));
        }
        Ok(set)
    }

    async fn clinic_timezone(&self, clinic_id: Uuid) -> Result<String, AppError> {
        let row = sqlx::query("SELECT timezone FROM clinics WHERE clinic_id = $1")
            .bind(clinic_id)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            Some(row) => Ok(row.try_get("timezone")?),
            None => Ok(self.default_timezone.clone()),
        }
    }

}

/// Composes the spoken-style summary, matching
/// `_process_availability_results`'s "X's next availability for Y is ..."
/// phrasing.
fn compose_message(practitioner_name: &str, service_name: &str, slots: &[OfferedSlot]) -> String {
    let descriptions: Vec<String> = slots
        .iter()
        .map(|s| format!("{} at {}", s.local_date, s.local_time))
        .collect();

    match descriptions.len() {
        2 => format!(
            "{practitioner_name}'s next availability for {service_name} is {} and {}.",
            descriptions[0], descriptions[1]
        ),
        1 => format!(
            "{practitioner_name}'s next availability for {service_name} is {}.",
            descriptions[0]
        ),
        _ => format!("I couldn't find any availability for {practitioner_name} in the requested window."),
    }
}

async fn check_single_inner(
    cache: &AvailabilityCache,
    pms: &PmsClient,
    clinic_id: Uuid,
    practitioner_id: Uuid,
    location_id: Uuid,
    service_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AvailabilitySlot>, PmsError> {
    if let Some(cached) = cache
        .get(practitioner_id, location_id, date)
        .await
        .map_err(|e| PmsError::Permanent(e.to_string()))?
    {
        return Ok(cached);
    }

    let fresh = pms
        .get_available_times(
            &location_id.to_string(),
            &practitioner_id.to_string(),
            &service_id.to_string(),
            date,
            date,
        )
        .await?;

    let slots: Vec<AvailabilitySlot> = fresh
        .into_iter()
        .map(|slot| AvailabilitySlot {
            practitioner_id,
            location_id,
            date,
            appointment_start_utc: slot.appointment_start,
            service_id: Some(service_id),
            duration_minutes: None,
        })
        .collect();

    cache
        .put(
            clinic_id,
            practitioner_id,
            location_id,
            date,
            &slots,
            std::time::Duration::from_secs(900),
        )
        .await
        .map_err(|e| PmsError::Permanent(e.to_string()))?;

    Ok(slots)
}

fn classify(err: PmsError) -> TaskError {
    match err {
        PmsError::Auth => TaskError::Permanent("pms auth rejected".to_string()),
        PmsError::NotFound => TaskError::Permanent("not found".to_string()),
        PmsError::RateLimited => TaskError::RateLimited,
        PmsError::Conflict(msg) => TaskError::Conflict(msg),
        PmsError::Transient(msg) => TaskError::Transient(msg),
        PmsError::Permanent(msg) => TaskError::Permanent(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot(date: &str, time: &str) -> OfferedSlot {
        OfferedSlot {
            appointment_start_utc: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            practitioner_id: Uuid::nil(),
            location_id: Uuid::nil(),
            service_id: Uuid::nil(),
            local_date: date.to_string(),
            local_time: time.to_string(),
        }
    }

    #[test]
    fn composes_two_slot_message() {
        let msg = compose_message(
            "Dr Smith",
            "Initial Consult",
            &[slot("Monday, March 02", "9:00 AM"), slot("Tuesday, March 03", "2:00 PM")],
        );
        assert_eq!(
            msg,
            "Dr Smith's next availability for Initial Consult is Monday, March 02 at 9:00 AM and Tuesday, March 03 at 2:00 PM."
        );
    }

    #[test]
    fn composes_single_slot_message() {
        let msg = compose_message("Dr Smith", "Initial Consult", &[slot("Monday, March 02", "9:00 AM")]);
        assert_eq!(
            msg,
            "Dr Smith's next availability for Initial Consult is Monday, March 02 at 9:00 AM."
        );
    }

    #[test]
    fn composes_no_availability_message_for_empty_slots() {
        let msg = compose_message("Dr Smith", "Initial Consult", &[]);
        assert!(msg.contains("couldn't find any availability"));
    }

    #[test]
    fn pms_conflict_is_not_retryable_once_classified() {
        let task_err = classify(PmsError::Conflict("slot taken".to_string()));
        assert!(!task_err.is_retryable());
    }

    #[test]
    fn pms_rate_limited_is_retryable_once_classified() {
        let task_err = classify(PmsError::RateLimited);
        assert!(task_err.is_retryable());
    }
}
