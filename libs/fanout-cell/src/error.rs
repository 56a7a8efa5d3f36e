use std::fmt;

/// Classification a task's future resolves to on failure. Only
/// `Transient` and `RateLimited` are retried; `Permanent` and `Conflict`
/// stop the task immediately.
#[derive(Debug, Clone)]
pub enum TaskError {
    Permanent(String),
    Conflict(String),
    Transient(String),
    RateLimited,
    Timeout,
    Cancelled,
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Transient(_) | TaskError::RateLimited)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Permanent(msg) => write!(f, "permanent: {msg}"),
            TaskError::Conflict(msg) => write!(f, "conflict: {msg}"),
            TaskError::Transient(msg) => write!(f, "transient: {msg}"),
            TaskError::RateLimited => write!(f, "rate limited"),
            TaskError::Timeout => write!(f, "timeout"),
            TaskError::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_rate_limited_are_retryable() {
        assert!(TaskError::Transient("x".into()).is_retryable());
        assert!(TaskError::RateLimited.is_retryable());
        assert!(!TaskError::Permanent("x".into()).is_retryable());
        assert!(!TaskError::Conflict("x".into()).is_retryable());
        assert!(!TaskError::Timeout.is_retryable());
        assert!(!TaskError::Cancelled.is_retryable());
    }
}
