use chrono::{Datelike, NaiveDate, NaiveTime};
use sqlx::Row;
use uuid::Uuid;

use shared_database::Database;
use shared_models::{AppError, PractitionerSchedule};

/// Precomputed working-day map over `practitioner_schedules`: for
/// each (practitioner, location, weekday) the earliest/latest observed
/// slot-of-day and the date interval the observation covers. Read side is
/// a pruning heuristic only — a date this rules out is never probed, but
/// the absence of a row never asserts "no availability".
pub struct ScheduleOracle {
    db: Database,
}

impl ScheduleOracle {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Filters `dates` down to the subset that fall on a weekday the
    /// practitioner is known to work at this location, within the
    /// observed effective interval. Dates with no matching row pass
    /// through unfiltered — an unprobed weekday isn't ruled out.
    pub async fn scheduled_days(
        &self,
        practitioner_id: Uuid,
        location_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, AppError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PractitionerSchedule>(
            "SELECT practitioner_id, location_id, day_of_week, effective_from, \
                    effective_until, earliest_time, latest_time \
             FROM practitioner_schedules \
             WHERE practitioner_id = $1 AND location_id = $2",
        )
        .bind(practitioner_id)
        .bind(location_id)
        .fetch_all(self.db.pool())
        .await?;

        if rows.is_empty() {
            return Ok(dates.to_vec());
        }

        let kept = dates
            .iter()
            .copied()
            .filter(|date| {
                let weekday = date.weekday().num_days_from_monday() as i16;
                let known_weekday = rows.iter().any(|r| r.day_of_week == weekday);
                if !known_weekday {
                    return true;
                }
                rows.iter().any(|r| r.day_of_week == weekday && within_interval(r, *date))
            })
            .collect();

        Ok(kept)
    }

    /// Grows the map with an empirical observation: a scan (at clinic
    /// init, or a long-horizon refresh) found `date` to be a working day
    /// for this practitioner/location, with appointments spanning
    /// `slot_times`. Extends the effective interval to cover `date` and
    /// widens earliest/latest to bracket the observed slots.
    pub async fn record_observation(
        &self,
        practitioner_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
        slot_times: &[NaiveTime],
    ) -> Result<(), AppError> {
        let day_of_week = date.weekday().num_days_from_monday() as i16;
        let earliest = slot_times.iter().min().copied();
        let latest = slot_times.iter().max().copied();

        sqlx::query(
            "INSERT INTO practitioner_schedules \
               (practitioner_id, location_id, day_of_week, effective_from, effective_until, \
                earliest_time, latest_time) \
             VALUES ($1, $2, $3, $4, $4, $5, $6) \
             ON CONFLICT (practitioner_id, location_id, day_of_week) DO UPDATE SET \
               effective_from = LEAST(practitioner_schedules.effective_from, EXCLUDED.effective_from), \
               effective_until = GREATEST(practitioner_schedules.effective_until, EXCLUDED.effective_until), \
               earliest_time = LEAST(practitioner_schedules.earliest_time, EXCLUDED.earliest_time), \
               latest_time = GREATEST(practitioner_schedules.latest_time, EXCLUDED.latest_time)",
        )
        .bind(practitioner_id)
        .bind(location_id)
        .bind(day_of_week)
        .bind(date)
        .bind(earliest)
        .bind(latest)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Records that a scan probed `date` and found no appointments at all
    /// — the practitioner doesn't work this weekday at this location, as
    /// far as the scan window shows. Unlike `record_observation`, this
    /// never widens an existing interval; it only creates a zero-slot row
    /// the first time the weekday is seen, so a single future gap doesn't
    /// erase a known pattern.
    pub async fn record_day_off(
        &self,
        practitioner_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), AppError> {
        let day_of_week = date.weekday().num_days_from_monday() as i16;

        sqlx::query(
            "INSERT INTO practitioner_schedules \
               (practitioner_id, location_id, day_of_week, effective_from, effective_until, \
                earliest_time, latest_time) \
             VALUES ($1, $2, $3, $4, $4, NULL, NULL) \
             ON CONFLICT (practitioner_id, location_id, day_of_week) DO NOTHING",
        )
        .bind(practitioner_id)
        .bind(location_id)
        .bind(day_of_week)
        .bind(date)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

fn within_interval(schedule: &PractitionerSchedule, date: NaiveDate) -> bool {
    let after_start = schedule.effective_from.map_or(true, |from| date >= from);
    let before_end = schedule.effective_until.map_or(true, |until| date <= until);
    after_start && before_end
}
