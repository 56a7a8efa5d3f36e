// Requires a running PostgreSQL database with migrations applied.
// Set DATABASE_URL to run them.

use std::sync::Arc;
use std::time::Duration;

use availability_cache_cell::AvailabilityCache;
use pms_client_cell::PmsClient;
use rate_limiter_cell::RateLimiter;
use shared_config::AppConfig;
use shared_database::Database;
use sync_cell::{ClinicLockRegistry, SyncOutcome, SyncService};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn connect() -> Database {
    let mut config = AppConfig::from_env();
    config.database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    Database::connect(&config).await.expect("connect")
}

#[tokio::test]
#[ignore]
async fn sync_with_no_changed_appointments_completes_with_zero_counts() {
    let db = connect().await;
    let cache = AvailabilityCache::new(db.clone());
    let locks = ClinicLockRegistry::new();
    let service = SyncService::new(
        db,
        cache,
        locks,
        Duration::from_secs(1),
        Duration::from_secs(30),
    );

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/individual_appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "individual_appointments": []
        })))
        .mount(&server)
        .await;

    let rate_limiter = Arc::new(RateLimiter::new(199, Duration::from_secs(60)));
    let pms = PmsClient::with_base_url("key", server.uri(), rate_limiter);
    let clinic_id = Uuid::new_v4();

    let outcome = service.sync(clinic_id, &pms, true).await.unwrap();
    match outcome {
        SyncOutcome::Completed(stats) => {
            assert_eq!(stats.updated, 0);
            assert_eq!(stats.errors, 0);
            assert_eq!(stats.deleted, 0);
        }
        SyncOutcome::Skipped => panic!("expected a completed sync"),
    }
}

#[tokio::test]
async fn a_held_lock_causes_the_second_caller_to_skip() {
    let locks = ClinicLockRegistry::new();
    let clinic_id = Uuid::new_v4();

    let _guard = locks
        .try_acquire(clinic_id, Duration::from_millis(50))
        .await
        .unwrap();

    let second = locks.try_acquire(clinic_id, Duration::from_millis(20)).await;
    assert!(second.is_none());
}
