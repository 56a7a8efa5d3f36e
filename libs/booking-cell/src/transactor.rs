use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

use availability_cache_cell::AvailabilityCache;
use fanout_cell::{FanoutEngine, FanoutTask, TaskError};
use pms_client_cell::{PmsClient, PmsError};
use resolver_cell::{PractitionerResolver, Resolution, ServiceResolver};
use shared_database::Database;
use shared_models::{AppError, AvailabilitySlot};
use sync_cell::ClinicLockRegistry;

use crate::types::{BookRequest, BookingConfirmation, CancelRequest, RescheduleRequest};

/// Drives the single-transaction booking flow: validate, probe
/// availability, call the PMS, and persist, all behind one commit.
pub struct BookingTransactor {
    db: Database,
    cache: Arc<AvailabilityCache>,
    pms: Arc<PmsClient>,
    locks: ClinicLockRegistry,
    fanout: Arc<FanoutEngine>,
    default_timezone: String,
    lock_wait: Duration,
}

impl BookingTransactor {
    pub fn new(
        db: Database,
        cache: Arc<AvailabilityCache>,
        pms: Arc<PmsClient>,
        locks: ClinicLockRegistry,
        fanout: Arc<FanoutEngine>,
        default_timezone: String,
        lock_wait: Duration,
    ) -> Self {
        Self {
            db,
            cache,
            pms,
            locks,
            fanout,
            default_timezone,
            lock_wait,
        }
    }

    pub async fn book(&self, req: &BookRequest) -> Result<BookingConfirmation, AppError> {
        // Holding the lock isn't required for correctness (AvailabilityCacheEntry
        // writes are last-writer-wins), but it keeps a forced full resync from
        // overwriting this booking's own invalidate with a stale fetch.
        let guard = self.locks.try_acquire(req.clinic_id, self.lock_wait).await;
        if guard.is_none() {
            warn!(clinic_id = %req.clinic_id, "booking proceeding while a sync holds the clinic lock");
        }

        let tz_name = self.clinic_timezone(req.clinic_id).await?;
        let tz = shared_utils::resolve_timezone(&tz_name, &self.default_timezone);

        let practitioners = PractitionerResolver::new(self.db.clone());
        let resolution = practitioners.resolve(req.clinic_id, &req.practitioner_query).await?;
        let practitioner = match resolution {
            Resolution::Resolved(c) | Resolution::Confirm(c) => c,
            Resolution::Clarify(mut candidates) if candidates.len() == 1 => candidates.remove(0),
            _ => return Err(AppError::PractitionerNotFound(req.practitioner_query.clone())),
        };

        let worked_locations: Vec<Uuid> = sqlx::query_scalar(
            "SELECT location_id FROM practitioner_locations WHERE practitioner_id = $1",
        )
        .bind(practitioner.id)
        .fetch_all(self.db.pool())
        .await?;

        if !worked_locations.contains(&req.location_id) {
            let actual_locations: Vec<String> = sqlx::query_scalar(
                "SELECT l.name FROM locations l WHERE l.location_id = ANY($1)",
            )
            .bind(&worked_locations)
            .fetch_all(self.db.pool())
            .await?;

            return Err(AppError::PractitionerLocationMismatch {
                practitioner: practitioner.name,
                actual_locations,
            });
        }

        let services = ServiceResolver::new(self.db.clone());
        let service = services
            .resolve(practitioner.id, &req.service_query)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound {
                practitioner: practitioner.name.clone(),
                service: req.service_query.clone(),
            })?;

        let duration_minutes: i32 =
            sqlx::query_scalar("SELECT duration_minutes FROM services WHERE service_id = $1")
                .bind(service.id)
                .fetch_one(self.db.pool())
                .await?;

        let start_utc = shared_utils::combine_local(req.appointment_date, req.appointment_time, tz);
        let end_utc = start_utc + chrono::Duration::minutes(duration_minutes as i64);

        let alternatives = self
            .ensure_slot_available(
                req.clinic_id,
                practitioner.id,
                req.location_id,
                service.id,
                req.appointment_date,
                start_utc,
                tz,
            )
            .await?;

        if let Some(alternatives) = alternatives {
            return Err(AppError::TimeNotAvailable { alternatives });
        }

        let mut tx = self.db.begin().await?;

        let caller_phone = shared_utils::normalize_phone(&req.caller_phone)?;
        let patient_phone = match &req.patient_phone {
            Some(p) => shared_utils::normalize_phone(p)?,
            None => caller_phone.clone(),
        };
        let (given, family) = split_name(req.patient_name.as_deref());

        let existing_patient = sqlx::query(
            "SELECT patient_id, pms_patient_id FROM patients \
             WHERE clinic_id = $1 AND normalized_phone = $2",
        )
        .bind(req.clinic_id)
        .bind(&patient_phone)
        .fetch_optional(&mut *tx)
        .await?;

        let (patient_id, mut pms_patient_id) = match existing_patient {
            Some(row) => (
                row.try_get::<Uuid, _>("patient_id")?,
                row.try_get::<Option<String>, _>("pms_patient_id")?,
            ),
            None => {
                let new_patient_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO patients (patient_id, clinic_id, normalized_phone, given_name, family_name) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(new_patient_id)
                .bind(req.clinic_id)
                .bind(&patient_phone)
                .bind(&given)
                .bind(&family)
                .execute(&mut *tx)
                .await?;
                (new_patient_id, None)
            }
        };

        if pms_patient_id.is_none() {
            let created = self
                .pms
                .create_patient(&given, &family, &patient_phone)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;

            sqlx::query("UPDATE patients SET pms_patient_id = $1 WHERE patient_id = $2")
                .bind(&created.id)
                .bind(patient_id)
                .execute(&mut *tx)
                .await?;

            pms_patient_id = Some(created.id);
        }
        let pms_patient_id = pms_patient_id.expect("set above");

        let pms = self.pms.clone();
        let practitioner_id_s = practitioner.id.to_string();
        let location_id_s = req.location_id.to_string();
        let service_id_s = service.id.to_string();
        let notes = req.notes.clone();

        let task = FanoutTask::new(move || {
            let pms = pms.clone();
            let pms_patient_id = pms_patient_id.clone();
            let practitioner_id_s = practitioner_id_s.clone();
            let location_id_s = location_id_s.clone();
            let service_id_s = service_id_s.clone();
            let notes = notes.clone();
            async move {
                pms.create_appointment(
                    &pms_patient_id,
                    &practitioner_id_s,
                    &service_id_s,
                    &location_id_s,
                    start_utc,
                    end_utc,
                    notes.as_deref(),
                )
                .await
                .map_err(classify)
            }
        });

        let mut outcomes = self.fanout.execute(vec![task], None).await;
        let outcome = outcomes.remove(0);

        let appointment = match outcome.result {
            Ok(appointment) => appointment,
            Err(TaskError::Conflict(reason)) => {
                sqlx::query(
                    "INSERT INTO failed_booking_attempts (practitioner_id, location_id, date, time_of_day, created_at, reason) \
                     VALUES ($1, $2, $3, $4, now(), $5)",
                )
                .bind(practitioner.id)
                .bind(req.location_id)
                .bind(req.appointment_date)
                .bind(req.appointment_time)
                .bind(&reason)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                self.cache
                    .invalidate(practitioner.id, req.location_id, req.appointment_date)
                    .await?;
                return Err(AppError::TimeJustTaken);
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(AppError::Internal(format!("booking failed: {e}")));
            }
        };

        sqlx::query(
            "INSERT INTO appointments \
               (appointment_id, clinic_id, patient_id, practitioner_id, service_id, location_id, \
                starts_at_utc, ends_at_utc, status, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'booked', $9)",
        )
        .bind(&appointment.id)
        .bind(req.clinic_id)
        .bind(patient_id)
        .bind(practitioner.id)
        .bind(service.id)
        .bind(req.location_id)
        .bind(start_utc)
        .bind(end_utc)
        .bind(&req.notes)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO voice_bookings (appointment_id, clinic_id, session_id, caller_phone, action, status, booking_details, created_at) \
             VALUES ($1, $2, $3, $4, 'book', 'completed', $5, now())",
        )
        .bind(&appointment.id)
        .bind(req.clinic_id)
        .bind(&req.session_id)
        .bind(&caller_phone)
        .bind(json!({
            "practitioner": practitioner.name,
            "service": service.name,
            "starts_at": start_utc.to_rfc3339(),
        }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.cache
            .invalidate(practitioner.id, req.location_id, req.appointment_date)
            .await?;

        let location_name: String =
            sqlx::query_scalar("SELECT name FROM locations WHERE location_id = $1")
                .bind(req.location_id)
                .fetch_one(self.db.pool())
                .await?;

        info!(appointment_id = %appointment.id, %practitioner.id, "booking completed");

        let local_date = shared_utils::format_date_for_voice(start_utc, tz);
        let local_time = shared_utils::format_time_for_voice(start_utc, tz);
        let message = format!(
            "Perfect! I've successfully booked your {} appointment with {} for {} at {}.",
            service.name, practitioner.name, local_date, local_time
        );

        Ok(BookingConfirmation {
            appointment_id: appointment.id,
            practitioner_name: practitioner.name,
            service_name: service.name,
            duration_minutes,
            local_date,
            local_time,
            location_name,
            message,
        })
    }

    /// Create-then-cancel: the new appointment is created first, and the
    /// old one is only cancelled once that succeeds — a caller never ends
    /// a reschedule with zero appointments.
    pub async fn reschedule(&self, req: &RescheduleRequest) -> Result<BookingConfirmation, AppError> {
        let current = sqlx::query(
            "SELECT practitioner_id, service_id, location_id \
             FROM appointments WHERE appointment_id = $1 AND clinic_id = $2",
        )
        .bind(&req.appointment_id)
        .bind(req.clinic_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(AppError::AppointmentNotFound)?;

        let practitioner_id: Uuid = current.try_get("practitioner_id")?;
        let location_id: Uuid = current.try_get("location_id")?;

        let practitioner_name: String = sqlx::query_scalar(
            "SELECT COALESCE(title || ' ', '') || given_name || ' ' || family_name \
             FROM practitioners WHERE practitioner_id = $1",
        )
        .bind(practitioner_id)
        .fetch_one(self.db.pool())
        .await?;

        let practitioner_query = req
            .new_practitioner_query
            .clone()
            .unwrap_or(practitioner_name);

        let service_query = match &req.new_service_query {
            Some(q) => q.clone(),
            None => {
                let service_id: Uuid = current.try_get("service_id")?;
                sqlx::query_scalar("SELECT name FROM services WHERE service_id = $1")
                    .bind(service_id)
                    .fetch_one(self.db.pool())
                    .await?
            }
        };

        // The patient already exists; re-derive their phone from the
        // appointment's own patient row instead of re-asking the caller.
        let caller_phone: String = sqlx::query_scalar(
            "SELECT p.normalized_phone FROM appointments a \
             JOIN patients p ON p.patient_id = a.patient_id \
             WHERE a.appointment_id = $1",
        )
        .bind(&req.appointment_id)
        .fetch_one(self.db.pool())
        .await?;

        let book_req = BookRequest {
            clinic_id: req.clinic_id,
            session_id: req.session_id.clone(),
            caller_phone,
            patient_phone: None,
            patient_name: None,
            practitioner_query,
            location_id,
            service_query,
            appointment_date: req.new_date,
            appointment_time: req.new_time,
            notes: req
                .notes
                .clone()
                .or_else(|| Some(format!("Rescheduled from appointment {}", req.appointment_id))),
        };

        let confirmation = self.book(&book_req).await?;

        match self.pms.cancel_appointment(&req.appointment_id).await {
            Ok(true) => {
                sqlx::query("UPDATE appointments SET status = 'cancelled' WHERE appointment_id = $1")
                    .bind(&req.appointment_id)
                    .execute(self.db.pool())
                    .await?;
            }
            _ => {
                warn!(
                    old_appointment_id = %req.appointment_id,
                    new_appointment_id = %confirmation.appointment_id,
                    "failed to cancel old appointment after reschedule; leaving a reconciliation task"
                );
                sqlx::query(
                    "INSERT INTO reconciliation_tasks \
                       (clinic_id, kind, old_appointment_id, new_appointment_id, created_at, resolved) \
                     VALUES ($1, 'reschedule_cancel_failed', $2, $3, now(), false)",
                )
                .bind(req.clinic_id)
                .bind(&req.appointment_id)
                .bind(&confirmation.appointment_id)
                .execute(self.db.pool())
                .await?;
            }
        }

        Ok(confirmation)
    }

    /// Cancels by id, or by a fuzzy match over the caller's own booked
    /// future appointments when no id is supplied.
    pub async fn cancel(&self, req: &CancelRequest) -> Result<String, AppError> {
        let appointment_id = match &req.appointment_id {
            Some(id) => id.clone(),
            None => {
                let description = req
                    .description
                    .as_deref()
                    .ok_or(AppError::AppointmentNotFound)?;
                self.find_by_description(req.clinic_id, &req.caller_phone, description)
                    .await?
                    .ok_or(AppError::AppointmentNotFound)?
            }
        };

        let success = self
            .pms
            .cancel_appointment(&appointment_id)
            .await
            .unwrap_or(false);

        if !success {
            return Err(AppError::CancellationFailed(
                "the PMS reported the cancellation did not go through".to_string(),
            ));
        }

        sqlx::query("UPDATE appointments SET status = 'cancelled' WHERE appointment_id = $1")
            .bind(&appointment_id)
            .execute(self.db.pool())
            .await?;

        sqlx::query(
            "INSERT INTO voice_bookings (appointment_id, clinic_id, session_id, caller_phone, action, status, booking_details, created_at) \
             VALUES ($1, $2, $3, $4, 'cancel', 'completed', $5, now())",
        )
        .bind(&appointment_id)
        .bind(req.clinic_id)
        .bind(&req.session_id)
        .bind(&req.caller_phone)
        .bind(json!({}))
        .execute(self.db.pool())
        .await?;

        Ok(appointment_id)
    }

    async fn find_by_description(
        &self,
        clinic_id: Uuid,
        caller_phone: &str,
        description: &str,
    ) -> Result<Option<String>, AppError> {
        let normalized_phone = shared_utils::normalize_phone(caller_phone)?;
        let normalized_query = shared_utils::normalize_for_matching(description);

        let row = sqlx::query(
            "SELECT a.appointment_id, \
                GREATEST( \
                    similarity(LOWER(pr.given_name || ' ' || pr.family_name), $3), \
                    similarity(LOWER(s.name), $3) \
                ) AS match_score \
             FROM appointments a \
             JOIN patients p ON p.patient_id = a.patient_id \
             JOIN practitioners pr ON pr.practitioner_id = a.practitioner_id \
             JOIN services s ON s.service_id = a.service_id \
             WHERE a.clinic_id = $1 AND p.normalized_phone = $2 \
               AND a.status = 'booked' AND a.starts_at_utc > now() \
             ORDER BY match_score DESC \
             LIMIT 1",
        )
        .bind(clinic_id)
        .bind(&normalized_phone)
        .bind(&normalized_query)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => {
                let score: f64 = row.try_get("match_score")?;
                if score <= 0.0 {
                    return Ok(None);
                }
                Ok(Some(row.try_get("appointment_id")?))
            }
            None => Ok(None),
        }
    }

    /// Returns `None` when the requested instant is available, or
    /// `Some(alternatives)` (human-formatted local times) when it isn't —
    /// falling back to one fresh PMS fetch when the cache is stale or
    /// missing.
    async fn ensure_slot_available(
        &self,
        clinic_id: Uuid,
        practitioner_id: Uuid,
        location_id: Uuid,
        service_id: Uuid,
        date: chrono::NaiveDate,
        start_utc: chrono::DateTime<Utc>,
        tz: chrono_tz::Tz,
    ) -> Result<Option<Vec<String>>, AppError> {
        if let Some(slots) = self
            .cache
            .get(practitioner_id, location_id, date)
            .await?
        {
            if slots.iter().any(|s| s.appointment_start_utc == start_utc) {
                return Ok(None);
            }
            return Ok(Some(alternatives_from(&slots, tz)));
        }

        let fresh = self
            .pms
            .get_available_times(
                &location_id.to_string(),
                &practitioner_id.to_string(),
                &service_id.to_string(),
                date,
                date,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

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

        self.cache
            .put(
                clinic_id,
                practitioner_id,
                location_id,
                date,
                &slots,
                Duration::from_secs(900),
            )
            .await?;

        if slots.iter().any(|s| s.appointment_start_utc == start_utc) {
            return Ok(None);
        }

        Ok(Some(alternatives_from(&slots, tz)))
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

fn alternatives_from(slots: &[AvailabilitySlot], tz: chrono_tz::Tz) -> Vec<String> {
    slots
        .iter()
        .take(5)
        .map(|s| shared_utils::format_time_for_voice(s.appointment_start_utc, tz))
        .collect()
}

fn split_name(name: Option<&str>) -> (String, String) {
    match name {
        None => ("Guest".to_string(), "Patient".to_string()),
        Some(name) => {
            let mut tokens = name.split_whitespace();
            let given = tokens.next().unwrap_or("Guest").to_string();
            let family = tokens.collect::<Vec<_>>().join(" ");
            let family = if family.is_empty() { "Patient".to_string() } else { family };
            (given, family)
        }
    }
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

    #[test]
    fn splits_two_token_name_into_given_and_family() {
        assert_eq!(split_name(Some("Jane Smith")), ("Jane".to_string(), "Smith".to_string()));
    }

    #[test]
    fn single_token_name_gets_a_placeholder_family_name() {
        assert_eq!(split_name(Some("Jane")), ("Jane".to_string(), "Patient".to_string()));
    }

    #[test]
    fn absent_name_falls_back_to_guest_patient() {
        assert_eq!(split_name(None), ("Guest".to_string(), "Patient".to_string()));
    }

    #[test]
    fn three_token_name_keeps_remaining_tokens_as_family_name() {
        assert_eq!(
            split_name(Some("Mary Jane Watson")),
            ("Mary".to_string(), "Jane Watson".to_string())
        );
    }

    #[test]
    fn pms_conflict_classifies_as_non_retryable_task_conflict() {
        let classified = classify(PmsError::Conflict("slot taken".to_string()));
        assert!(matches!(classified, TaskError::Conflict(_)));
        assert!(!classified.is_retryable());
    }

    #[test]
    fn pms_rate_limit_classifies_as_retryable() {
        assert!(classify(PmsError::RateLimited).is_retryable());
    }

    #[test]
    fn pms_auth_failure_classifies_as_permanent() {
        let classified = classify(PmsError::Auth);
        assert!(matches!(classified, TaskError::Permanent(_)));
        assert!(!classified.is_retryable());
    }
}
