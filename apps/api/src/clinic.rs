//! Clinic lookup by dialed number and per-clinic PMS client construction,
//! since each clinic carries its own PMS credentials and shard even though
//! the rate limiter underneath is shared process-wide.

use std::sync::Arc;

use pms_client_cell::PmsClient;
use rate_limiter_cell::RateLimiter;
use shared_database::Database;
use shared_models::{AppError, Clinic};
use sqlx::Row;

pub async fn load_clinic(db: &Database, dialed_number: &str) -> Result<Clinic, AppError> {
    let row = sqlx::query(
        "SELECT clinic_id, dialed_number, pms_api_key, pms_shard, timezone, contact_email \
         FROM clinics WHERE dialed_number = $1",
    )
    .bind(dialed_number)
    .fetch_optional(db.pool())
    .await?;

    let Some(row) = row else {
        return Err(AppError::ClinicNotFound);
    };

    Ok(Clinic {
        clinic_id: row.try_get("clinic_id")?,
        dialed_number: row.try_get("dialed_number")?,
        pms_api_key: row.try_get("pms_api_key")?,
        pms_shard: row.try_get("pms_shard")?,
        timezone: row.try_get("timezone")?,
        contact_email: row.try_get("contact_email")?,
    })
}

pub fn pms_client_for(clinic: &Clinic, rate_limiter: Arc<RateLimiter>) -> Arc<PmsClient> {
    Arc::new(PmsClient::new(&clinic.pms_api_key, &clinic.pms_shard, rate_limiter))
}
