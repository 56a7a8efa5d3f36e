//! Clinic-timezone-aware formatting of instants into the spoken style the
//! voice agent reads back to callers, grounded on
//! `tools/timezone_utils.py`'s `get_clinic_timezone`/`format_time_for_voice`.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolves a clinic's stored IANA timezone name, falling back to the
/// configured default on anything unparseable (blank, typo'd, absent).
pub fn resolve_timezone(timezone: &str, default_timezone: &str) -> Tz {
    timezone
        .trim()
        .parse()
        .or_else(|_| default_timezone.parse())
        .unwrap_or(chrono_tz::Australia::Sydney)
}

/// Combines a clinic-local date and time in `tz` into the UTC instant,
/// grounded on `tools/timezone_utils.py::combine_date_time_local`.
/// Ambiguous/nonexistent local times (DST folds/gaps) resolve to the
/// earliest of the candidate offsets rather than failing the booking.
pub fn combine_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

/// `"9:05 AM"` — 12-hour clock, no leading zero, matching the voice
/// agent's spoken style.
pub fn format_time_for_voice(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    local.format("%I:%M %p").to_string().trim_start_matches('0').to_string()
}

/// `"Tuesday, March 03"`.
pub fn format_date_for_voice(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%A, %B %d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unparseable_timezone_falls_back_to_default() {
        let tz = resolve_timezone("not-a-zone", "Australia/Sydney");
        assert_eq!(tz, chrono_tz::Australia::Sydney);
    }

    #[test]
    fn valid_timezone_is_used_as_is() {
        let tz = resolve_timezone("America/New_York", "Australia/Sydney");
        assert_eq!(tz, chrono_tz::America::New_York);
    }

    #[test]
    fn voice_time_drops_leading_zero() {
        let instant = Utc.with_ymd_and_hms(2026, 3, 3, 23, 5, 0).unwrap();
        let formatted = format_time_for_voice(instant, chrono_tz::Australia::Sydney);
        assert!(!formatted.starts_with('0'));
        assert!(formatted.ends_with("AM") || formatted.ends_with("PM"));
    }

    #[test]
    fn combine_local_round_trips_through_the_same_timezone() {
        use chrono::NaiveDate;

        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let tz = chrono_tz::Australia::Sydney;

        let utc = combine_local(date, time, tz);
        let back = utc.with_timezone(&tz);
        assert_eq!(back.date_naive(), date);
        assert_eq!(back.time(), time);
    }
}
