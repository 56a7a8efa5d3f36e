use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use rate_limiter_cell::RateLimiter;

use crate::error::PmsError;
use crate::types::{ChangedAppointment, PmsAppointment, PmsPatient, PmsSlot};

/// Thin typed façade over the PMS REST surface. Every outbound call
/// `acquire()`s the shared rate limiter before hitting the network; retries
/// are not performed here (that's a fan-out concern).
pub struct PmsClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    rate_limiter: Arc<RateLimiter>,
}

impl PmsClient {
    pub fn new(api_key: &str, shard: &str, rate_limiter: Arc<RateLimiter>) -> Self {
        Self::with_base_url(
            api_key,
            format!("https://api.{shard}.cliniko.com/v1"),
            rate_limiter,
        )
    }

    /// Points the client at an arbitrary base URL. Production code always
    /// goes through [`PmsClient::new`]; this exists so tests can target a
    /// mock server instead of the real PMS.
    pub fn with_base_url(api_key: &str, base_url: String, rate_limiter: Arc<RateLimiter>) -> Self {
        let auth_b64 = STANDARD.encode(format!("{api_key}:"));
        Self {
            http: reqwest::Client::new(),
            base_url,
            auth_header: format!("Basic {auth_b64}"),
            rate_limiter,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PmsError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "pms GET");
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("User-Agent", "VoiceBookingSystem/1.0")
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        self.decode(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, PmsError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "pms POST");
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("User-Agent", "VoiceBookingSystem/1.0")
            .json(&body)
            .send()
            .await?;
        self.decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), PmsError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "pms DELETE");
        let response = self
            .http
            .delete(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        self.decode(response).await.map(|_| ())
    }

    async fn decode(&self, response: reqwest::Response) -> Result<Value, PmsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "pms error response");
            return Err(PmsError::from_status(status, &body));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response.json::<Value>().await.map_err(PmsError::from)
    }

    /// Follows `links.next` until exhausted, collecting the entity array
    /// found under `entity_key` on every page.
    async fn get_all_pages(&self, path: &str, entity_key: &str) -> Result<Vec<Value>, PmsError> {
        let mut all = Vec::new();
        let mut next_url: Option<String> = Some(format!("{}{}", self.base_url, path));

        while let Some(url) = next_url {
            self.rate_limiter.acquire().await;
            let response = self
                .http
                .get(&url)
                .header("Authorization", &self.auth_header)
                .header("User-Agent", "VoiceBookingSystem/1.0")
                .send()
                .await?;
            let page = self.decode(response).await?;

            if let Some(items) = page.get(entity_key).and_then(Value::as_array) {
                all.extend(items.clone());
            }
            next_url = page
                .get("links")
                .and_then(|l| l.get("next"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(all)
    }

    pub async fn find_patient_by_phone(&self, phone: &str) -> Result<Option<PmsPatient>, PmsError> {
        let page = self
            .get(
                "/patients",
                &[("q[]", format!("patient_phone_numbers.number:={phone}"))],
            )
            .await?;

        let candidates = page
            .get("patients")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for candidate in candidates {
            if let Ok(patient) = serde_json::from_value::<PmsPatient>(candidate) {
                return Ok(Some(patient));
            }
        }
        Ok(None)
    }

    pub async fn create_patient(
        &self,
        given: &str,
        family: &str,
        phone: &str,
    ) -> Result<PmsPatient, PmsError> {
        let body = json!({
            "first_name": given,
            "last_name": family,
            "patient_phone_numbers": [{ "phone_type": "Mobile", "number": phone }],
        });
        let created = self.post("/patients", body).await?;
        serde_json::from_value(created).map_err(|e| PmsError::Permanent(e.to_string()))
    }

    pub async fn get_available_times(
        &self,
        location: &str,
        practitioner: &str,
        service: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<PmsSlot>, PmsError> {
        let path = format!(
            "/businesses/{location}/practitioners/{practitioner}/appointment_types/{service}/available_times"
        );
        let page = self
            .get(
                &path,
                &[
                    ("from".to_string(), date_from.to_string()),
                    ("to".to_string(), date_to.to_string()),
                ]
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect::<Vec<_>>(),
            )
            .await?;

        let slots = page
            .get("available_times")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        slots
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| PmsError::Permanent(e.to_string())))
            .collect()
    }

    pub async fn create_appointment(
        &self,
        patient_id: &str,
        practitioner_id: &str,
        service_id: &str,
        location_id: &str,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<PmsAppointment, PmsError> {
        let body = json!({
            "patient_id": patient_id,
            "practitioner_id": practitioner_id,
            "appointment_type_id": service_id,
            "business_id": location_id,
            "starts_at": start_utc.to_rfc3339(),
            "ends_at": end_utc.to_rfc3339(),
            "notes": notes,
        });
        let created = self.post("/individual_appointments", body).await?;
        serde_json::from_value(created).map_err(|e| PmsError::Permanent(e.to_string()))
    }

    pub async fn cancel_appointment(&self, appointment_id: &str) -> Result<bool, PmsError> {
        self.delete(&format!("/individual_appointments/{appointment_id}"))
            .await
            .map(|_| true)
    }

    pub async fn list_changed(
        &self,
        since_utc: DateTime<Utc>,
    ) -> Result<Vec<ChangedAppointment>, PmsError> {
        let path = "/individual_appointments";
        let page = self
            .get(
                path,
                &[(
                    "q[]".to_string(),
                    format!("updated_at:>{}", since_utc.to_rfc3339()),
                )]
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect::<Vec<_>>(),
            )
            .await?;

        let items = page
            .get("individual_appointments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| PmsError::Permanent(e.to_string())))
            .collect()
    }
}
