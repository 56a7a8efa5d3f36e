use std::time::Instant;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use availability_cache_cell::AvailabilityCache;
use shared_models::AppError;
use sync_cell::{SyncOutcome, SyncService, SyncStats};

use crate::clinic;
use crate::handlers::error_response;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sync-cache", post(sync_cache))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncCacheRequest {
    session_id: String,
    dialed_number: String,
    #[serde(default)]
    force_full_sync: bool,
}

#[derive(Debug, Default, Serialize)]
struct SyncStatsDto {
    updated: u32,
    errors: u32,
    deleted: u32,
}

impl From<SyncStats> for SyncStatsDto {
    fn from(stats: SyncStats) -> Self {
        Self {
            updated: stats.updated,
            errors: stats.errors,
            deleted: stats.deleted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncCacheResponse {
    success: bool,
    session_id: String,
    sync_type: String,
    sync_in_progress: bool,
    sync_stats: SyncStatsDto,
    duration_ms: u64,
    last_sync_time: DateTime<Utc>,
}

async fn sync_cache(State(state): State<AppState>, Json(req): Json<SyncCacheRequest>) -> Response {
    match run(&state, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run(state: &AppState, req: &SyncCacheRequest) -> Result<SyncCacheResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;
    let pms = clinic::pms_client_for(&clinic, state.rate_limiter.clone());

    let cache = AvailabilityCache::new(state.db.clone());
    let sync = SyncService::new(
        state.db.clone(),
        cache,
        state.clinic_locks.clone(),
        state.config.sync_lock_wait,
        state.config.sync_hard_cap,
    );

    let started = Instant::now();
    let outcome = sync.sync(clinic.clinic_id, &pms, req.force_full_sync).await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    let (sync_type, stats, in_progress) = match outcome {
        SyncOutcome::Skipped => ("skipped", SyncStats::default(), true),
        SyncOutcome::Completed(stats) => {
            let kind = if req.force_full_sync { "full" } else { "incremental" };
            (kind, stats, false)
        }
    };

    Ok(SyncCacheResponse {
        success: true,
        session_id: req.session_id.clone(),
        sync_type: sync_type.to_string(),
        sync_in_progress: in_progress,
        sync_stats: stats.into(),
        duration_ms,
        last_sync_time: Utc::now(),
    })
}
