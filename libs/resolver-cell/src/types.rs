use serde::Serialize;
use shared_models::ConfidenceTier;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub score: f64,
}

/// Shape of the three-tier resolution contract, shared by all three resolvers.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// High confidence — act immediately.
    Resolved(Candidate),
    /// Medium confidence — ask a one-shot confirmation against the top
    /// candidate before acting.
    Confirm(Candidate),
    /// Low confidence, or more than one candidate tied above threshold —
    /// enumerate up to three options.
    Clarify(Vec<Candidate>),
    NoMatch,
}

impl Resolution {
    pub fn from_candidates(mut candidates: Vec<Candidate>) -> Self {
        candidates.retain(|c| c.score > 0.0);
        let Some(best) = candidates.first().cloned() else {
            return Resolution::NoMatch;
        };

        match ConfidenceTier::from_score(best.score) {
            ConfidenceTier::High => Resolution::Resolved(best),
            ConfidenceTier::Medium => Resolution::Confirm(best),
            ConfidenceTier::Low => {
                candidates.truncate(3);
                Resolution::Clarify(candidates)
            }
            ConfidenceTier::NoMatch => Resolution::NoMatch,
        }
    }
}
