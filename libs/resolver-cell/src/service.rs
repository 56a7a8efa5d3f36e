use shared_database::Database;
use shared_models::AppError;
use sqlx::Row;
use uuid::Uuid;

use crate::types::Candidate;

/// Matches a free-text service name against a single practitioner's
/// offerings. Unlike location/practitioner resolution this is
/// strict: exact or normalized-substring match only, never fuzzy, and
/// never crossing into another practitioner's services.
pub struct ServiceResolver {
    db: Database,
}

impl ServiceResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn resolve(
        &self,
        practitioner_id: Uuid,
        query: &str,
    ) -> Result<Option<Candidate>, AppError> {
        let normalized_query = shared_utils::normalize_for_matching(query);

        let rows = sqlx::query(
            "SELECT s.service_id, s.name \
             FROM services s \
             JOIN practitioner_services ps ON ps.service_id = s.service_id \
             WHERE ps.practitioner_id = $1 AND s.active = true",
        )
        .bind(practitioner_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut exact = None;
        let mut substring = None;
        for row in rows {
            let service_id: Uuid = row.try_get("service_id")?;
            let name: String = row.try_get("name")?;
            let normalized_name = shared_utils::normalize_for_matching(&name);

            if normalized_name == normalized_query {
                exact = Some(Candidate {
                    id: service_id,
                    name,
                    score: 1.0,
                });
                break;
            }
            if substring.is_none()
                && (normalized_name.contains(&normalized_query)
                    || normalized_query.contains(&normalized_name))
            {
                substring = Some(Candidate {
                    id: service_id,
                    name,
                    score: 0.7,
                });
            }
        }

        Ok(exact.or(substring))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_treats_whitespace_variants_as_equal() {
        assert_eq!(
            shared_utils::normalize_for_matching("Initial  Consult"),
            shared_utils::normalize_for_matching("initial consult")
        );
    }
}
