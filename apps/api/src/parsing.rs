//! Date/time phrase parsing. Full natural-language parsing is treated as an
//! external collaborator: this is the narrow adapter that turns the handful
//! of shapes the voice agent actually sends — an ISO date, or
//! "today"/"tomorrow" — into the `NaiveDate`/`NaiveTime` the core
//! components require.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use shared_models::AppError;

pub fn parse_date_request(raw: &str, tz: Tz) -> Result<NaiveDate, AppError> {
    let trimmed = raw.trim();
    let today = Utc::now().with_timezone(&tz).date_naive();

    match trimmed.to_lowercase().as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + ChronoDuration::days(1)),
        _ => {}
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(raw.to_string()))
}

pub fn parse_time_request(raw: &str) -> Result<NaiveTime, AppError> {
    let trimmed = raw.trim();

    for format in ["%H:%M", "%I:%M %p", "%I:%M%p", "%I %p", "%I%p"] {
        if let Ok(time) = NaiveTime::parse_from_str(&normalize_meridiem(trimmed), format) {
            return Ok(time);
        }
    }

    Err(AppError::InvalidTime(raw.to_string()))
}

/// `"2pm"` → `"2 PM"` so chrono's `%I %p`/`%I:%M %p` formats can match it.
fn normalize_meridiem(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if let Some(stripped) = lower.strip_suffix("am") {
        format!("{} AM", stripped.trim())
    } else if let Some(stripped) = lower.strip_suffix("pm") {
        format!("{} PM", stripped.trim())
    } else {
        raw.to_string()
    }
}
