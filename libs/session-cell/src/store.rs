use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::Row;

use shared_database::Database;
use shared_models::{AppError, PreferredLocation, SessionState};

/// Per-session state keyed by `session_id`: rejected slot instants,
/// the last criteria fingerprint, and a preferred location. Single-writer
/// per session by convention — every write is an upsert.
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionState, AppError> {
        let row = sqlx::query(
            "SELECT session_id, rejected_slot_instants, last_criteria_fingerprint, preferred_location \
             FROM session_state WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(SessionState {
                session_id: session_id.to_string(),
                ..Default::default()
            });
        };

        let rejected_raw: serde_json::Value = row.try_get("rejected_slot_instants")?;
        let rejected_slot_instants: Vec<DateTime<Utc>> =
            serde_json::from_value(rejected_raw).map_err(|e| AppError::Database(e.to_string()))?;

        let preferred_raw: Option<serde_json::Value> = row.try_get("preferred_location")?;
        let preferred_location: Option<PreferredLocation> = preferred_raw
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(SessionState {
            session_id: row.try_get("session_id")?,
            rejected_slot_instants,
            last_criteria_fingerprint: row.try_get("last_criteria_fingerprint")?,
            preferred_location,
        })
    }

    pub async fn upsert(&self, state: &SessionState) -> Result<(), AppError> {
        let rejected = serde_json::to_value(&state.rejected_slot_instants)
            .map_err(|e| AppError::Database(e.to_string()))?;
        let preferred = state
            .preferred_location
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO session_state \
               (session_id, rejected_slot_instants, last_criteria_fingerprint, preferred_location, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (session_id) DO UPDATE SET \
               rejected_slot_instants = EXCLUDED.rejected_slot_instants, \
               last_criteria_fingerprint = EXCLUDED.last_criteria_fingerprint, \
               preferred_location = EXCLUDED.preferred_location, \
               updated_at = now()",
        )
        .bind(&state.session_id)
        .bind(rejected)
        .bind(&state.last_criteria_fingerprint)
        .bind(preferred)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Clears the rejected-slot set when the caller's criteria fingerprint
    /// has moved on from the last search — a change in what's being asked
    /// for invalidates which offered slots count as "already declined".
    pub async fn reset_if_fingerprint_changed(
        &self,
        session_id: &str,
        new_fingerprint: &str,
    ) -> Result<SessionState, AppError> {
        let mut state = self.get(session_id).await?;

        if state.last_criteria_fingerprint.as_deref() != Some(new_fingerprint) {
            state.rejected_slot_instants.clear();
            state.last_criteria_fingerprint = Some(new_fingerprint.to_string());
            self.upsert(&state).await?;
        }

        Ok(state)
    }

    /// Deletes rows not updated within `max_age` — session state outlives
    /// a single call but is not kept indefinitely.
    pub async fn purge(&self, max_age: ChronoDuration) -> Result<u64, AppError> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM session_state WHERE updated_at < $1")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
