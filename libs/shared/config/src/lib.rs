use std::env;
use std::time::Duration;
use tracing::warn;

/// Rate limiter defaults: 199 calls per 60s window — one-call safety margin
/// under the PMS's 200/minute ceiling.
const DEFAULT_RATE_LIMIT_MAX_CALLS: u32 = 199;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

const DEFAULT_FANOUT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_FANOUT_PER_TASK_TIMEOUT_SECS: u64 = 20;
const DEFAULT_FANOUT_MAX_RETRIES: u32 = 3;
const DEFAULT_FANOUT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_FANOUT_BATCH_DEADLINE_SECS: u64 = 75;

const DEFAULT_AVAILABILITY_CACHE_TTL_SECS: u64 = 900;

const DEFAULT_SYNC_WATERMARK_OVERLAP_SECS: i64 = 300;
const DEFAULT_SYNC_HARD_CAP_SECS: u64 = 300;
const DEFAULT_SYNC_LOCK_WAIT_MS: u64 = 1000;

const DEFAULT_FAILED_BOOKING_SUPPRESSION_SECS: i64 = 7200;

const DEFAULT_BOOKING_TRANSACTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub api_key: String,
    pub app_env: String,
    pub default_timezone: String,

    pub rate_limit_max_calls: u32,
    pub rate_limit_window: Duration,

    pub fanout_max_concurrency: usize,
    pub fanout_per_task_timeout: Duration,
    pub fanout_max_retries: u32,
    pub fanout_backoff_base: Duration,
    pub fanout_batch_deadline: Duration,

    pub availability_cache_ttl: Duration,

    pub sync_watermark_overlap_secs: i64,
    pub sync_hard_cap: Duration,
    pub sync_lock_wait: Duration,

    pub failed_booking_suppression_secs: i64,

    pub booking_transaction_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| {
                warn!("DATABASE_URL not set, using empty value");
                String::new()
            }),
            api_key: env::var("API_KEY").unwrap_or_else(|_| {
                warn!("API_KEY not set, using empty value");
                String::new()
            }),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .unwrap_or_else(|_| "Australia/Sydney".to_string()),

            rate_limit_max_calls: env_parse("RATE_LIMIT_MAX_CALLS", DEFAULT_RATE_LIMIT_MAX_CALLS),
            rate_limit_window: Duration::from_secs(env_parse(
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )),

            fanout_max_concurrency: env_parse(
                "FANOUT_MAX_CONCURRENCY",
                DEFAULT_FANOUT_MAX_CONCURRENCY,
            ),
            fanout_per_task_timeout: Duration::from_secs(env_parse(
                "FANOUT_PER_TASK_TIMEOUT_SECS",
                DEFAULT_FANOUT_PER_TASK_TIMEOUT_SECS,
            )),
            fanout_max_retries: env_parse("FANOUT_MAX_RETRIES", DEFAULT_FANOUT_MAX_RETRIES),
            fanout_backoff_base: Duration::from_millis(env_parse(
                "FANOUT_BACKOFF_BASE_MS",
                DEFAULT_FANOUT_BACKOFF_BASE_MS,
            )),
            fanout_batch_deadline: Duration::from_secs(env_parse(
                "FANOUT_BATCH_DEADLINE_SECS",
                DEFAULT_FANOUT_BATCH_DEADLINE_SECS,
            )),

            availability_cache_ttl: Duration::from_secs(env_parse(
                "AVAILABILITY_CACHE_TTL_SECS",
                DEFAULT_AVAILABILITY_CACHE_TTL_SECS,
            )),

            sync_watermark_overlap_secs: env_parse(
                "SYNC_WATERMARK_OVERLAP_SECS",
                DEFAULT_SYNC_WATERMARK_OVERLAP_SECS,
            ),
            sync_hard_cap: Duration::from_secs(env_parse(
                "SYNC_HARD_CAP_SECS",
                DEFAULT_SYNC_HARD_CAP_SECS,
            )),
            sync_lock_wait: Duration::from_millis(env_parse(
                "SYNC_LOCK_WAIT_MS",
                DEFAULT_SYNC_LOCK_WAIT_MS,
            )),

            failed_booking_suppression_secs: env_parse(
                "FAILED_BOOKING_SUPPRESSION_SECS",
                DEFAULT_FAILED_BOOKING_SUPPRESSION_SECS,
            ),

            booking_transaction_timeout: Duration::from_secs(env_parse(
                "BOOKING_TRANSACTION_TIMEOUT_SECS",
                DEFAULT_BOOKING_TRANSACTION_TIMEOUT_SECS,
            )),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty() && (self.is_development() || !self.api_key.is_empty())
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} could not be parsed, using default", key);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".to_string(),
            api_key: "k".to_string(),
            app_env: "production".to_string(),
            default_timezone: "Australia/Sydney".to_string(),
            rate_limit_max_calls: DEFAULT_RATE_LIMIT_MAX_CALLS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            fanout_max_concurrency: DEFAULT_FANOUT_MAX_CONCURRENCY,
            fanout_per_task_timeout: Duration::from_secs(DEFAULT_FANOUT_PER_TASK_TIMEOUT_SECS),
            fanout_max_retries: DEFAULT_FANOUT_MAX_RETRIES,
            fanout_backoff_base: Duration::from_millis(DEFAULT_FANOUT_BACKOFF_BASE_MS),
            fanout_batch_deadline: Duration::from_secs(DEFAULT_FANOUT_BATCH_DEADLINE_SECS),
            availability_cache_ttl: Duration::from_secs(DEFAULT_AVAILABILITY_CACHE_TTL_SECS),
            sync_watermark_overlap_secs: DEFAULT_SYNC_WATERMARK_OVERLAP_SECS,
            sync_hard_cap: Duration::from_secs(DEFAULT_SYNC_HARD_CAP_SECS),
            sync_lock_wait: Duration::from_millis(DEFAULT_SYNC_LOCK_WAIT_MS),
            failed_booking_suppression_secs: DEFAULT_FAILED_BOOKING_SUPPRESSION_SECS,
            booking_transaction_timeout: Duration::from_secs(
                DEFAULT_BOOKING_TRANSACTION_TIMEOUT_SECS,
            ),
        }
    }

    #[test]
    fn defaults_match_spec_constants() {
        let config = base_config();
        assert_eq!(config.rate_limit_max_calls, 199);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.failed_booking_suppression_secs, 7200);
    }

    #[test]
    fn not_configured_without_database_url() {
        let mut config = base_config();
        config.database_url = String::new();
        assert!(!config.is_configured());
    }

    #[test]
    fn missing_api_key_tolerated_in_development() {
        let mut config = base_config();
        config.api_key = String::new();
        config.app_env = "development".to_string();
        assert!(config.is_configured());
    }

    #[test]
    fn missing_api_key_rejected_in_production() {
        let mut config = base_config();
        config.api_key = String::new();
        assert!(!config.is_configured());
    }
}
