use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use resolver_cell::{PractitionerResolver, Resolution};
use serde::{Deserialize, Serialize};
use shared_models::AppError;
use sqlx::Row;
use uuid::Uuid;

use crate::clinic;
use crate::handlers::error_response;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/get-practitioner-services", post(get_practitioner_services))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PractitionerServicesRequest {
    practitioner: String,
    session_id: String,
    dialed_number: String,
    #[serde(default)]
    #[allow(dead_code)]
    caller_phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct ServiceSummary {
    #[serde(rename = "serviceId")]
    service_id: Uuid,
    name: String,
    #[serde(rename = "durationMinutes")]
    duration_minutes: i32,
    category: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PractitionerServicesResponse {
    success: bool,
    session_id: String,
    practitioner: String,
    practitioner_id: Uuid,
    service_names: Vec<String>,
    service_details: Vec<ServiceSummary>,
    categories: Vec<String>,
    message: String,
}

async fn get_practitioner_services(
    State(state): State<AppState>,
    Json(req): Json<PractitionerServicesRequest>,
) -> Response {
    match run(&state, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(&req.session_id, err),
    }
}

async fn run(
    state: &AppState,
    req: &PractitionerServicesRequest,
) -> Result<PractitionerServicesResponse, AppError> {
    let clinic = clinic::load_clinic(&state.db, &req.dialed_number).await?;

    let resolver = PractitionerResolver::new(state.db.clone());
    let resolution = resolver.resolve(clinic.clinic_id, &req.practitioner).await?;

    let candidate = match resolution {
        Resolution::Resolved(candidate) | Resolution::Confirm(candidate) => candidate,
        Resolution::Clarify(candidates) => candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::PractitionerNotFound(req.practitioner.clone()))?,
        Resolution::NoMatch => return Err(AppError::PractitionerNotFound(req.practitioner.clone())),
    };

    let rows = sqlx::query(
        "SELECT s.service_id, s.name, s.duration_minutes \
         FROM services s \
         JOIN practitioner_services ps ON ps.service_id = s.service_id \
         WHERE ps.practitioner_id = $1 AND s.active = true \
         ORDER BY s.name",
    )
    .bind(candidate.id)
    .fetch_all(state.db.pool())
    .await?;

    let services = rows
        .into_iter()
        .map(|row| -> Result<ServiceSummary, AppError> {
            let name: String = row.try_get("name")?;
            let category = categorize(&name);
            Ok(ServiceSummary {
                service_id: row.try_get("service_id")?,
                duration_minutes: row.try_get("duration_minutes")?,
                category,
                name,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut categories: Vec<String> = services.iter().map(|s| s.category.clone()).collect();
    categories.sort();
    categories.dedup();

    let service_names: Vec<String> = services.iter().map(|s| s.name.clone()).collect();
    let message = build_message(&candidate.name, &service_names, &categories);

    Ok(PractitionerServicesResponse {
        success: true,
        session_id: req.session_id.clone(),
        practitioner: candidate.name,
        practitioner_id: candidate.id,
        service_names,
        service_details: services,
        categories,
        message,
    })
}

fn categorize(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.contains("initial") || lower.contains("first") || lower.contains("new") {
        "New Patient".to_string()
    } else if lower.contains("follow") || lower.contains("return") || lower.contains("subsequent") {
        "Follow Up".to_string()
    } else if lower.contains("massage") {
        "Massage".to_string()
    } else if lower.contains("acupuncture") {
        "Acupuncture".to_string()
    } else if lower.contains("consult") {
        "Consultation".to_string()
    } else {
        "General".to_string()
    }
}

fn build_message(practitioner_name: &str, service_names: &[String], categories: &[String]) -> String {
    match service_names.len() {
        0 => format!("{practitioner_name} doesn't have any services configured."),
        1 => format!("{practitioner_name} offers {}.", service_names[0]),
        2 => format!(
            "{practitioner_name} offers {} and {}.",
            service_names[0], service_names[1]
        ),
        3 => format!(
            "{practitioner_name} offers {}, and {}.",
            service_names[..2].join(", "),
            service_names[2]
        ),
        total => {
            if categories.len() == 1 {
                format!(
                    "{practitioner_name} offers {total} {} services.",
                    categories[0].to_lowercase()
                )
            } else {
                let (last, rest) = categories.split_last().expect("checked non-empty above");
                format!(
                    "{practitioner_name} offers {total} services including {}, and {}.",
                    rest.iter().map(|c| c.to_lowercase()).collect::<Vec<_>>().join(", "),
                    last.to_lowercase()
                )
            }
        }
    }
}
