use thiserror::Error;

/// Classification of PMS failures per the component design: retries are
/// the fan-out engine's concern, this layer only classifies.
#[derive(Error, Debug)]
pub enum PmsError {
    #[error("PMS rejected our credentials")]
    Auth,
    #[error("PMS has no record of this resource")]
    NotFound,
    #[error("PMS is throttling us")]
    RateLimited,
    #[error("PMS reports a conflict: {0}")]
    Conflict(String),
    #[error("transient PMS failure: {0}")]
    Transient(String),
    #[error("permanent PMS rejection: {0}")]
    Permanent(String),
}

impl PmsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PmsError::Transient(_) | PmsError::RateLimited)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => PmsError::Auth,
            404 => PmsError::NotFound,
            409 => PmsError::Conflict(body.to_string()),
            429 => PmsError::RateLimited,
            500..=599 => PmsError::Transient(format!("{status}: {body}")),
            _ => PmsError::Permanent(format!("{status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for PmsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            PmsError::Transient(err.to_string())
        } else {
            PmsError::Permanent(err.to_string())
        }
    }
}
