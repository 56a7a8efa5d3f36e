use shared_database::Database;
use shared_models::AppError;
use sqlx::Row;
use uuid::Uuid;

use crate::types::{Candidate, Resolution};

/// Resolves free-text location queries against a clinic's businesses:
/// trigram similarity over name and aliases, boosted by exact "main/usual"
/// keywords and the caller's visit history, single-location clinics
/// short-circuiting to high confidence.
pub struct LocationResolver {
    db: Database,
}

impl LocationResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn resolve(
        &self,
        clinic_id: Uuid,
        query: &str,
        caller_phone: Option<&str>,
    ) -> Result<Resolution, AppError> {
        let normalized = shared_utils::normalize_for_matching(query);

        let location_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM locations WHERE clinic_id = $1")
                .bind(clinic_id)
                .fetch_one(self.db.pool())
                .await?;
        if location_count.0 == 1 {
            let row = sqlx::query("SELECT location_id, name FROM locations WHERE clinic_id = $1")
                .bind(clinic_id)
                .fetch_one(self.db.pool())
                .await?;
            return Ok(Resolution::Resolved(Candidate {
                id: row.try_get("location_id")?,
                name: row.try_get("name")?,
                score: 1.0,
            }));
        }

        let rows = sqlx::query(
            "WITH caller_history AS ( \
                SELECT a.location_id, COUNT(*) AS visit_count \
                FROM appointments a \
                JOIN patients p ON a.patient_id = p.patient_id \
                WHERE p.normalized_phone = $3 AND a.clinic_id = $1 \
                  AND a.status NOT IN ('cancelled', 'no_show') \
                GROUP BY a.location_id \
            ) \
            SELECT \
                l.location_id, \
                l.name, \
                l.is_primary, \
                COALESCE(ch.visit_count, 0) AS visit_count, \
                GREATEST( \
                    similarity(LOWER(l.name), $2), \
                    COALESCE(( \
                        SELECT MAX(similarity(LOWER(la.alias), $2)) \
                        FROM location_aliases la WHERE la.location_id = l.location_id \
                    ), 0), \
                    CASE \
                        WHEN l.is_primary AND $2 IN ('main', 'primary', 'main clinic', 'your clinic') THEN 0.9 \
                        WHEN $2 IN ('my usual', 'usual place', 'normal place') AND COALESCE(ch.visit_count, 0) > 0 THEN 0.95 \
                        ELSE 0 \
                    END, \
                    CASE WHEN COALESCE(ch.visit_count, 0) > 0 THEN 0.3 ELSE 0 END \
                ) AS match_score \
            FROM locations l \
            LEFT JOIN caller_history ch ON l.location_id = ch.location_id \
            WHERE l.clinic_id = $1 \
            ORDER BY match_score DESC, visit_count DESC, l.is_primary DESC",
        )
        .bind(clinic_id)
        .bind(&normalized)
        .bind(caller_phone)
        .fetch_all(self.db.pool())
        .await?;

        let candidates = rows
            .into_iter()
            .map(|row| -> Result<Candidate, AppError> {
                Ok(Candidate {
                    id: row.try_get("location_id")?,
                    name: row.try_get("name")?,
                    score: row.try_get::<f64, _>("match_score")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Resolution::from_candidates(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_resolution_is_resolved_not_clarify() {
        let candidates = vec![Candidate {
            id: Uuid::nil(),
            name: "Main Clinic".to_string(),
            score: 0.92,
        }];
        assert!(matches!(
            Resolution::from_candidates(candidates),
            Resolution::Resolved(_)
        ));
    }

    #[test]
    fn medium_confidence_asks_for_confirmation() {
        let candidates = vec![Candidate {
            id: Uuid::nil(),
            name: "North Clinic".to_string(),
            score: 0.6,
        }];
        assert!(matches!(
            Resolution::from_candidates(candidates),
            Resolution::Confirm(_)
        ));
    }

    #[test]
    fn low_confidence_enumerates_up_to_three() {
        let candidates = (0..5)
            .map(|i| Candidate {
                id: Uuid::nil(),
                name: format!("Clinic {i}"),
                score: 0.2,
            })
            .collect();
        match Resolution::from_candidates(candidates) {
            Resolution::Clarify(options) => assert_eq!(options.len(), 3),
            other => panic!("expected Clarify, got {other:?}"),
        }
    }
}
