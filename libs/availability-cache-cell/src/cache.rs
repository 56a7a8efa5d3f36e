use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use shared_database::Database;
use shared_models::{AppError, AvailabilitySlot};

/// The relational availability cache. `get` never returns stale or expired
/// rows; `put` is last-writer-wins; the component is the only writer of
/// `cached_at`/`expires_at`.
pub struct AvailabilityCache {
    db: Database,
}

impl AvailabilityCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        practitioner_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Vec<AvailabilitySlot>>, AppError> {
        let row = sqlx::query(
            "SELECT available_slots FROM availability_cache \
             WHERE practitioner_id = $1 AND location_id = $2 AND date = $3 \
               AND expires_at > now() AND NOT is_stale",
        )
        .bind(practitioner_id)
        .bind(location_id)
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => {
                let raw: serde_json::Value = row.try_get("available_slots")?;
                let slots: Vec<AvailabilitySlot> =
                    serde_json::from_value(raw).map_err(|e| AppError::Database(e.to_string()))?;
                Ok(Some(slots))
            }
            None => Ok(None),
        }
    }

    pub async fn put(
        &self,
        clinic_id: Uuid,
        practitioner_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
        slots: &[AvailabilitySlot],
        ttl: std::time::Duration,
    ) -> Result<(), AppError> {
        let payload =
            serde_json::to_value(slots).map_err(|e| AppError::Database(e.to_string()))?;
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(900));
        let expires_at = Utc::now() + ttl;

        sqlx::query(
            "INSERT INTO availability_cache \
               (clinic_id, practitioner_id, location_id, date, available_slots, cached_at, expires_at, is_stale) \
             VALUES ($1, $2, $3, $4, $5, now(), $6, false) \
             ON CONFLICT (practitioner_id, location_id, date) DO UPDATE SET \
               available_slots = EXCLUDED.available_slots, \
               cached_at = now(), \
               expires_at = EXCLUDED.expires_at, \
               is_stale = false",
        )
        .bind(clinic_id)
        .bind(practitioner_id)
        .bind(location_id)
        .bind(date)
        .bind(payload)
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn invalidate(
        &self,
        practitioner_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE availability_cache SET is_stale = true \
             WHERE practitioner_id = $1 AND location_id = $2 AND date = $3",
        )
        .bind(practitioner_id)
        .bind(location_id)
        .bind(date)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Marks every entry for a clinic as stale; used when a broad
    /// invalidation predicate (rather than a single triple) is known, e.g.
    /// a forced full resync.
    pub async fn mark_all_stale(&self, clinic_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE availability_cache SET is_stale = true WHERE clinic_id = $1 AND NOT is_stale",
        )
        .bind(clinic_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Periodic sweep: deletes entries whose `expires_at` is older than
    /// `now - grace`, run independently of any single `get`/`put` call.
    pub async fn sweep(&self, grace: std::time::Duration) -> Result<u64, AppError> {
        let grace = ChronoDuration::from_std(grace).unwrap_or(ChronoDuration::zero());
        let cutoff: DateTime<Utc> = Utc::now() - grace;
        let result = sqlx::query("DELETE FROM availability_cache WHERE expires_at < $1")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
