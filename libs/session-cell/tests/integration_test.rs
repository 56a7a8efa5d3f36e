// Requires a running PostgreSQL database with migrations applied.
// Set DATABASE_URL to run them.

use chrono::Utc;
use session_cell::SessionStore;
use shared_config::AppConfig;
use shared_database::Database;
use shared_models::SessionState;

async fn connect() -> Database {
    let mut config = AppConfig::from_env();
    config.database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    Database::connect(&config).await.expect("connect")
}

#[tokio::test]
#[ignore]
async fn upsert_then_get_round_trips_rejected_slots() {
    let db = connect().await;
    let store = SessionStore::new(db);

    let session_id = format!("sess-{}", uuid::Uuid::new_v4());
    let state = SessionState {
        session_id: session_id.clone(),
        rejected_slot_instants: vec![Utc::now()],
        last_criteria_fingerprint: Some("fp-1".to_string()),
        preferred_location: None,
    };

    store.upsert(&state).await.unwrap();
    let fetched = store.get(&session_id).await.unwrap();
    assert_eq!(fetched.rejected_slot_instants.len(), 1);
    assert_eq!(fetched.last_criteria_fingerprint.as_deref(), Some("fp-1"));
}

#[tokio::test]
#[ignore]
async fn fingerprint_change_clears_rejected_slots() {
    let db = connect().await;
    let store = SessionStore::new(db);

    let session_id = format!("sess-{}", uuid::Uuid::new_v4());
    let state = SessionState {
        session_id: session_id.clone(),
        rejected_slot_instants: vec![Utc::now()],
        last_criteria_fingerprint: Some("fp-1".to_string()),
        preferred_location: None,
    };
    store.upsert(&state).await.unwrap();

    let reset = store
        .reset_if_fingerprint_changed(&session_id, "fp-2")
        .await
        .unwrap();
    assert!(reset.rejected_slot_instants.is_empty());
    assert_eq!(reset.last_criteria_fingerprint.as_deref(), Some("fp-2"));
}
