use shared_database::Database;
use shared_models::AppError;
use sqlx::Row;
use uuid::Uuid;

use crate::types::{Candidate, Resolution};

const PREFIXES: &[&str] = &["dr", "mr", "ms", "mrs", "prof"];

/// Splits a free-text practitioner name into its recognized parts. A
/// leading token matching a known prefix (with or without a trailing
/// period) is peeled off; the remainder is treated as given/family name
/// depending on how many tokens are left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedName {
    pub prefix: Option<String>,
    pub given: Option<String>,
    pub family: Option<String>,
}

pub fn parse_name(raw: &str) -> ParsedName {
    let mut tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut prefix = None;

    if let Some(first) = tokens.first() {
        let stripped = first.trim_end_matches('.').to_lowercase();
        if PREFIXES.contains(&stripped.as_str()) {
            prefix = Some(stripped);
            tokens.remove(0);
        }
    }

    match tokens.len() {
        0 => ParsedName {
            prefix,
            given: None,
            family: None,
        },
        1 => ParsedName {
            prefix,
            given: None,
            family: Some(tokens[0].to_string()),
        },
        _ => ParsedName {
            prefix,
            given: Some(tokens[0].to_string()),
            family: Some(tokens[tokens.len() - 1].to_string()),
        },
    }
}

/// Resolves free-text practitioner names against a clinic's staff.
/// Exact prefix-plus-family matches score 0.95; otherwise falls back to
/// trigram similarity on the full name.
pub struct PractitionerResolver {
    db: Database,
}

impl PractitionerResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn resolve(
        &self,
        clinic_id: Uuid,
        query: &str,
    ) -> Result<Resolution, AppError> {
        let parsed = parse_name(query);
        let normalized_query = shared_utils::normalize_for_matching(query);
        let exact_family = parsed.family.clone().filter(|_| parsed.prefix.is_some());

        let rows = sqlx::query(
            "SELECT \
                practitioner_id, \
                COALESCE(title || ' ', '') || given_name || ' ' || family_name AS full_name, \
                GREATEST( \
                    similarity(LOWER(COALESCE(title || ' ', '') || given_name || ' ' || family_name), $2), \
                    CASE WHEN $3::text IS NOT NULL AND LOWER(family_name) = LOWER($3) THEN 0.95 ELSE 0 END \
                ) AS match_score \
             FROM practitioners \
             WHERE clinic_id = $1 AND active = true \
             ORDER BY match_score DESC",
        )
        .bind(clinic_id)
        .bind(&normalized_query)
        .bind(&exact_family)
        .fetch_all(self.db.pool())
        .await?;

        let candidates = rows
            .into_iter()
            .map(|row| -> Result<Candidate, AppError> {
                Ok(Candidate {
                    id: row.try_get("practitioner_id")?,
                    name: row.try_get("full_name")?,
                    score: row.try_get::<f64, _>("match_score")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Resolution::from_candidates(candidates))
    }

    /// Detects whether a resolved candidate's given name is shared by
    /// another active practitioner at the same location, requiring voice
    /// responses to use the full name rather than just the given name.
    pub async fn given_name_is_ambiguous_at_location(
        &self,
        clinic_id: Uuid,
        location_id: Uuid,
        given_name: &str,
    ) -> Result<bool, AppError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM practitioners p \
             JOIN practitioner_schedules ps ON ps.practitioner_id = p.practitioner_id \
             WHERE p.clinic_id = $1 AND ps.location_id = $2 \
               AND p.active = true AND LOWER(p.given_name) = LOWER($3)",
        )
        .bind(clinic_id)
        .bind(location_id)
        .bind(given_name)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.0 > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_given_and_family() {
        let parsed = parse_name("Dr. Jane Smith");
        assert_eq!(parsed.prefix.as_deref(), Some("dr"));
        assert_eq!(parsed.given.as_deref(), Some("Jane"));
        assert_eq!(parsed.family.as_deref(), Some("Smith"));
    }

    #[test]
    fn parses_family_only_query() {
        let parsed = parse_name("Smith");
        assert_eq!(parsed.prefix, None);
        assert_eq!(parsed.given, None);
        assert_eq!(parsed.family.as_deref(), Some("Smith"));
    }

    #[test]
    fn prefix_without_period_is_still_recognized() {
        let parsed = parse_name("Dr Patel");
        assert_eq!(parsed.prefix.as_deref(), Some("dr"));
        assert_eq!(parsed.family.as_deref(), Some("Patel"));
    }

    #[test]
    fn single_token_query_has_no_given_name() {
        let parsed = parse_name("Chen");
        assert_eq!(parsed.given, None);
        assert_eq!(parsed.family.as_deref(), Some("Chen"));
    }
}
