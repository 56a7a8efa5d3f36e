use std::sync::Arc;

use fanout_cell::{FanoutConfig, FanoutEngine};
use rate_limiter_cell::RateLimiter;
use shared_config::AppConfig;
use shared_database::Database;
use sync_cell::ClinicLockRegistry;

/// Everything a handler needs, shared across every request. The rate
/// limiter and fan-out engine are process-wide singletons; the clinic lock
/// registry is the same instance handed to both the sync path and the
/// booking path so the two actually contend on the same per-clinic mutex.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub rate_limiter: Arc<RateLimiter>,
    pub fanout: Arc<FanoutEngine>,
    pub clinic_locks: ClinicLockRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_calls,
            config.rate_limit_window,
        ));
        let fanout = Arc::new(FanoutEngine::new(
            FanoutConfig {
                max_concurrency: config.fanout_max_concurrency,
                per_task_timeout: config.fanout_per_task_timeout,
                max_retries: config.fanout_max_retries,
                backoff_base: config.fanout_backoff_base,
            },
            rate_limiter.clone(),
        ));

        Self {
            config,
            db,
            rate_limiter,
            fanout,
            clinic_locks: ClinicLockRegistry::new(),
        }
    }
}
