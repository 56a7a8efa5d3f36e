use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use availability_cache_cell::AvailabilityCache;
use pms_client_cell::{ChangedAppointment, PmsClient};
use shared_database::Database;
use shared_models::AppError;

use crate::registry::ClinicLockRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub updated: u32,
    pub errors: u32,
    pub deleted: u32,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Another sync (or booking's cache-invalidating path) held the
    /// clinic's lock; the caller should proceed without a fresh sync.
    Skipped,
    Completed(SyncStats),
}

pub struct SyncService {
    db: Database,
    cache: AvailabilityCache,
    locks: ClinicLockRegistry,
    lock_wait: StdDuration,
    hard_cap: StdDuration,
}

impl SyncService {
    pub fn new(
        db: Database,
        cache: AvailabilityCache,
        locks: ClinicLockRegistry,
        lock_wait: StdDuration,
        hard_cap: StdDuration,
    ) -> Self {
        Self {
            db,
            cache,
            locks,
            lock_wait,
            hard_cap,
        }
    }

    /// Runs an incremental sync for a clinic. `force_full` rewinds
    /// the watermark to seven days ago regardless of the last sync.
    pub async fn sync(
        &self,
        clinic_id: Uuid,
        pms: &PmsClient,
        force_full: bool,
    ) -> Result<SyncOutcome, AppError> {
        let Some(_guard) = self.locks.try_acquire(clinic_id, self.lock_wait).await else {
            info!(%clinic_id, "sync skipped, already in progress");
            return Ok(SyncOutcome::Skipped);
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.hard_cap, self.run(clinic_id, pms, force_full)).await;

        match result {
            Ok(Ok(stats)) => {
                self.record_log(clinic_id, stats, start.elapsed(), true).await;
                Ok(SyncOutcome::Completed(stats))
            }
            Ok(Err(e)) => {
                self.record_log(clinic_id, SyncStats::default(), start.elapsed(), false)
                    .await;
                Err(e)
            }
            Err(_) => {
                warn!(%clinic_id, "sync hit hard cap");
                self.record_log(clinic_id, SyncStats::default(), start.elapsed(), false)
                    .await;
                Err(AppError::Internal("sync exceeded hard cap".to_string()))
            }
        }
    }

    async fn run(
        &self,
        clinic_id: Uuid,
        pms: &PmsClient,
        force_full: bool,
    ) -> Result<SyncStats, AppError> {
        let watermark = self.watermark(clinic_id, force_full).await?;
        let since = watermark - ChronoDuration::minutes(5);

        let changed = pms
            .list_changed(since)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        info!(%clinic_id, count = changed.len(), "processing changed appointments");

        let mut stats = SyncStats::default();
        for appointment in changed {
            match self.process(clinic_id, &appointment, pms).await {
                Ok(removed) => {
                    if removed {
                        stats.deleted += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Err(e) => {
                    error!(appointment_id = %appointment.id, error = %e, "sync item failed");
                    stats.errors += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn watermark(&self, clinic_id: Uuid, force_full: bool) -> Result<DateTime<Utc>, AppError> {
        if force_full {
            return Ok(Utc::now() - ChronoDuration::days(7));
        }

        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT MAX(cached_at) FROM availability_cache WHERE clinic_id = $1")
                .bind(clinic_id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(match row.and_then(|(ts,)| ts) {
            Some(ts) => ts,
            None => Utc::now() - ChronoDuration::days(7),
        })
    }

    async fn process(
        &self,
        clinic_id: Uuid,
        appointment: &ChangedAppointment,
        pms: &PmsClient,
    ) -> Result<bool, AppError> {
        let practitioner_id = Uuid::parse_str(&appointment.practitioner_id)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let location_id = Uuid::parse_str(&appointment.business_id)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let date = appointment.appointment_date;

        if appointment.is_removed() {
            self.cache.invalidate(practitioner_id, location_id, date).await?;
            return Ok(true);
        }

        let service_id: Option<(Uuid,)> = sqlx::query_as(
            "SELECT service_id FROM practitioner_services WHERE practitioner_id = $1 LIMIT 1",
        )
        .bind(practitioner_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some((service_id,)) = service_id else {
            warn!(%practitioner_id, "no service mapping, skipping refresh");
            return Ok(false);
        };

        let slots = pms
            .get_available_times(
                &location_id.to_string(),
                &practitioner_id.to_string(),
                &service_id.to_string(),
                date,
                date,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let slots: Vec<shared_models::AvailabilitySlot> = slots
            .into_iter()
            .map(|s| shared_models::AvailabilitySlot {
                practitioner_id,
                location_id,
                date,
                appointment_start_utc: s.appointment_start,
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
                StdDuration::from_secs(900),
            )
            .await?;

        Ok(false)
    }

    async fn record_log(&self, clinic_id: Uuid, stats: SyncStats, duration: StdDuration, succeeded: bool) {
        let result = sqlx::query(
            "INSERT INTO sync_log (clinic_id, updated_count, deleted_count, error_count, duration_ms, succeeded, ran_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now())",
        )
        .bind(clinic_id)
        .bind(stats.updated as i32)
        .bind(stats.deleted as i32)
        .bind(stats.errors as i32)
        .bind(duration.as_millis() as i64)
        .bind(succeeded)
        .execute(self.db.pool())
        .await;

        if let Err(e) = result {
            error!(%clinic_id, error = %e, "failed to record sync log");
        }
    }
}
