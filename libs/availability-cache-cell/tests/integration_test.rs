// Integration tests for the availability cache.
// These require a running PostgreSQL database with migrations applied.
// Set DATABASE_URL to run them.

use availability_cache_cell::AvailabilityCache;
use chrono::{DateTime, Utc};
use shared_config::AppConfig;
use shared_database::Database;
use shared_models::AvailabilitySlot;
use uuid::Uuid;

async fn connect() -> Database {
    let mut config = AppConfig::from_env();
    config.database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    Database::connect(&config).await.expect("connect")
}

fn sample_slot(practitioner_id: Uuid, location_id: Uuid, date: chrono::NaiveDate) -> AvailabilitySlot {
    AvailabilitySlot {
        practitioner_id,
        location_id,
        date,
        appointment_start_utc: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        service_id: None,
        duration_minutes: Some(30),
    }
}

#[tokio::test]
#[ignore]
async fn put_then_get_round_trips_within_ttl() {
    let db = connect().await;
    let cache = AvailabilityCache::new(db);

    let practitioner_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let date = chrono::Utc::now().date_naive();
    let slots = vec![sample_slot(practitioner_id, location_id, date)];

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
        .unwrap();

    let fetched = cache.get(practitioner_id, location_id, date).await.unwrap();
    assert_eq!(fetched.map(|s| s.len()), Some(1));
}

#[tokio::test]
#[ignore]
async fn invalidate_makes_entry_unreadable_even_before_expiry() {
    let db = connect().await;
    let cache = AvailabilityCache::new(db);

    let practitioner_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let date = chrono::Utc::now().date_naive();
    let slots = vec![sample_slot(practitioner_id, location_id, date)];

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
        .unwrap();
    cache
        .invalidate(practitioner_id, location_id, date)
        .await
        .unwrap();

    let fetched = cache.get(practitioner_id, location_id, date).await.unwrap();
    assert!(fetched.is_none());
}
