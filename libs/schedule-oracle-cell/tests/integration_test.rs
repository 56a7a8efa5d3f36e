// Requires a running PostgreSQL database with migrations applied.
// Set DATABASE_URL to run them.

use chrono::NaiveDate;
use schedule_oracle_cell::ScheduleOracle;
use shared_config::AppConfig;
use shared_database::Database;
use uuid::Uuid;

async fn connect() -> Database {
    let mut config = AppConfig::from_env();
    config.database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    Database::connect(&config).await.expect("connect")
}

#[tokio::test]
#[ignore]
async fn recorded_observation_prunes_other_weekdays() {
    let db = connect().await;
    let oracle = ScheduleOracle::new(db);

    let practitioner_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();

    // A Monday in 2026.
    let monday: NaiveDate = "2026-02-02".parse().unwrap();
    let tuesday: NaiveDate = "2026-02-03".parse().unwrap();

    oracle
        .record_observation(
            practitioner_id,
            location_id,
            monday,
            &["09:00:00".parse().unwrap(), "14:00:00".parse().unwrap()],
        )
        .await
        .unwrap();
    oracle
        .record_day_off(practitioner_id, location_id, tuesday)
        .await
        .unwrap();

    let kept = oracle
        .scheduled_days(practitioner_id, location_id, &[monday, tuesday])
        .await
        .unwrap();

    assert_eq!(kept, vec![monday]);
}

#[tokio::test]
#[ignore]
async fn unprobed_weekday_passes_through_unfiltered() {
    let db = connect().await;
    let oracle = ScheduleOracle::new(db);

    let practitioner_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();
    let wednesday: NaiveDate = "2026-02-04".parse().unwrap();

    let kept = oracle
        .scheduled_days(practitioner_id, location_id, &[wednesday])
        .await
        .unwrap();

    assert_eq!(kept, vec![wednesday]);
}
