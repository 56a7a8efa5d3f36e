// Requires a running PostgreSQL database with migrations applied and at
// least one seeded clinic. Set DATABASE_URL to run them.

use resolver_cell::{LocationResolver, Resolution};
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
async fn single_location_clinic_short_circuits_to_high_confidence() {
    let db = connect().await;
    let resolver = LocationResolver::new(db.clone());

    let clinic_id: (Uuid,) =
        sqlx::query_as("SELECT clinic_id FROM clinics WHERE dialed_number = $1")
            .bind("+611300000000")
            .fetch_one(db.pool())
            .await
            .expect("seeded single-location clinic");

    let outcome = resolver
        .resolve(clinic_id.0, "literally anything", None)
        .await
        .unwrap();
    assert!(matches!(outcome, Resolution::Resolved(ref c) if c.score == 1.0));
}
