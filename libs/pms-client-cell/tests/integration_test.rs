use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pms_client_cell::PmsClient;
use rate_limiter_cell::RateLimiter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unthrottled_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(199, Duration::from_secs(60)))
}

#[tokio::test]
async fn find_patient_by_phone_returns_none_on_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "patients": []
        })))
        .mount(&server)
        .await;

    let client = PmsClient::with_base_url("key", server.uri(), unthrottled_limiter());
    let found = client.find_patient_by_phone("61412345678").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn get_available_times_follows_no_pagination_for_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/businesses/loc-1/practitioners/prac-1/appointment_types/svc-1/available_times",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "available_times": [
                { "appointment_start": "2026-08-01T09:00:00Z" },
                { "appointment_start": "2026-08-01T09:30:00Z" },
            ]
        })))
        .mount(&server)
        .await;

    let client = PmsClient::with_base_url("key", server.uri(), unthrottled_limiter());
    let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
    let slots = client
        .get_available_times("loc-1", "prac-1", "svc-1", date, date)
        .await
        .unwrap();
    assert_eq!(slots.len(), 2);
}

#[tokio::test]
async fn create_appointment_conflict_classifies_as_conflict_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/individual_appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("slot already booked"))
        .mount(&server)
        .await;

    let client = PmsClient::with_base_url("key", server.uri(), unthrottled_limiter());
    let now = chrono::Utc::now();
    let err = client
        .create_appointment("pat-1", "prac-1", "svc-1", "loc-1", now, now, None)
        .await
        .unwrap_err();
    assert!(matches!(err, pms_client_cell::PmsError::Conflict(_)));
}

#[tokio::test]
async fn cancel_appointment_succeeds_on_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/individual_appointments/appt-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = PmsClient::with_base_url("key", server.uri(), unthrottled_limiter());
    let cancelled = client.cancel_appointment("appt-1").await.unwrap();
    assert!(cancelled);
}
