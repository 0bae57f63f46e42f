//! Daily focus totals and goal progress.
//!
//! A session belongs to the local calendar day its start falls in. Totals are
//! whole minutes, truncated.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, Result, ValidationError};
use crate::storage::{Database, DAILY_GOAL_KEY, DEFAULT_DAILY_GOAL_MINUTES};

/// Target focus minutes per day. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct DailyGoal(u32);

impl DailyGoal {
    /// # Errors
    /// Returns a validation error when `minutes` is zero, negative, or too large.
    pub fn new(minutes: i64) -> Result<Self, ValidationError> {
        if minutes <= 0 {
            return Err(ValidationError::InvalidValue {
                field: DAILY_GOAL_KEY.into(),
                message: format!("{minutes} must be > 0"),
            });
        }
        u32::try_from(minutes)
            .map(Self)
            .map_err(|_| ValidationError::InvalidValue {
                field: DAILY_GOAL_KEY.into(),
                message: format!("{minutes} is too large"),
            })
    }

    pub fn minutes(self) -> u32 {
        self.0
    }
}

impl Default for DailyGoal {
    fn default() -> Self {
        Self(DEFAULT_DAILY_GOAL_MINUTES)
    }
}

impl TryFrom<i64> for DailyGoal {
    type Error = ValidationError;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<DailyGoal> for u32 {
    fn from(goal: DailyGoal) -> Self {
        goal.0
    }
}

/// Fraction of the goal reached, clamped to `[0, 1]`.
pub fn goal_progress(today_minutes: u64, goal: DailyGoal) -> f64 {
    (today_minutes as f64 / f64::from(goal.minutes())).clamp(0.0, 1.0)
}

/// Whole minutes in `total_secs`, fractions dropped.
pub fn secs_to_minutes(total_secs: u64) -> u64 {
    total_secs / 60
}

/// UTC bounds of `date` in `tz`: `[midnight, next midnight)`.
///
/// When a DST jump skips midnight the earliest valid local time of the day is used.
pub fn day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (start_of_day(date, tz), start_of_day(next, tz))
}

fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    if let Some(start) = tz.from_local_datetime(&midnight).earliest() {
        return start.with_timezone(&Utc);
    }
    // Midnight falls in a gap; step forward until a local time exists.
    (1..=4)
        .map(|h| midnight + TimeDelta::minutes(30 * h))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Summary of one day's focus, as shown by `tasker stats today`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub focus_minutes: u64,
    pub session_count: u64,
    pub goal_minutes: u32,
    pub progress: f64,
}

/// Computes daily totals from recorded sessions.
pub struct DailyAggregator {
    db: Arc<Database>,
}

impl DailyAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Focus minutes for sessions started today (local time).
    pub fn today_focus_minutes(&self) -> Result<u64> {
        self.focus_minutes_on(Local::now().date_naive(), &Local)
    }

    pub fn focus_minutes_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Result<u64> {
        let (start, end) = day_bounds(date, tz);
        let secs = self.db.sum_session_secs_between(start, end)?;
        Ok(secs_to_minutes(secs))
    }

    pub fn today_session_count(&self) -> Result<u64> {
        self.session_count_on(Local::now().date_naive(), &Local)
    }

    pub fn session_count_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Result<u64> {
        let (start, end) = day_bounds(date, tz);
        Ok(self.db.count_sessions_between(start, end)?)
    }

    /// The stored goal, or the default when none is stored.
    ///
    /// # Errors
    /// Returns a config error if the stored value is not a positive integer.
    pub fn goal(&self) -> Result<DailyGoal> {
        let Some(raw) = self.db.setting_get(DAILY_GOAL_KEY)? else {
            return Ok(DailyGoal::default());
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: DAILY_GOAL_KEY.into(),
            message,
        };
        let minutes: i64 = raw
            .trim()
            .parse()
            .map_err(|_| invalid(format!("'{raw}' is not an integer")))?;
        Ok(DailyGoal::new(minutes).map_err(|e| invalid(e.to_string()))?)
    }

    /// Validate and store a new goal. A rejected value leaves the old one in place.
    pub fn set_goal(&self, minutes: i64) -> Result<DailyGoal> {
        let goal = DailyGoal::new(minutes)?;
        self.db
            .setting_set(DAILY_GOAL_KEY, &goal.minutes().to_string())?;
        info!(goal_minutes = goal.minutes(), "daily goal updated");
        Ok(goal)
    }

    /// Today's progress toward the stored goal.
    pub fn goal_progress(&self) -> Result<f64> {
        Ok(goal_progress(self.today_focus_minutes()?, self.goal()?))
    }

    pub fn summary(&self) -> Result<DailySummary> {
        self.summary_on(Local::now().date_naive(), &Local)
    }

    pub fn summary_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Result<DailySummary> {
        let focus_minutes = self.focus_minutes_on(date, tz)?;
        let goal = self.goal()?;
        Ok(DailySummary {
            date,
            focus_minutes,
            session_count: self.session_count_on(date, tz)?,
            goal_minutes: goal.minutes(),
            progress: goal_progress(focus_minutes, goal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewFocusSession;
    use chrono::FixedOffset;
    use proptest::prelude::*;

    fn aggregator() -> (Arc<Database>, DailyAggregator) {
        let db = Arc::new(Database::open_memory().unwrap());
        (db.clone(), DailyAggregator::new(db))
    }

    fn insert(db: &Database, start: DateTime<Utc>, secs: u64) {
        db.insert_session(&NewFocusSession {
            task_id: None,
            started_at: start,
            ended_at: start + TimeDelta::seconds(secs as i64),
            duration_secs: secs,
        })
        .unwrap();
    }

    #[test]
    fn goal_defaults_to_120() {
        let (_, agg) = aggregator();
        assert_eq!(agg.goal().unwrap().minutes(), 120);
    }

    #[test]
    fn set_goal_zero_is_rejected_and_keeps_old_value() {
        let (_, agg) = aggregator();
        agg.set_goal(90).unwrap();
        assert!(agg.set_goal(0).is_err());
        assert!(agg.set_goal(-5).is_err());
        assert_eq!(agg.goal().unwrap().minutes(), 90);
    }

    #[test]
    fn corrupt_goal_setting_is_reported() {
        let (db, agg) = aggregator();
        db.setting_set(DAILY_GOAL_KEY, "lots").unwrap();
        assert!(agg.goal().is_err());
        db.setting_set(DAILY_GOAL_KEY, "0").unwrap();
        assert!(agg.goal().is_err());
    }

    #[test]
    fn sums_sessions_within_local_day() {
        let (db, agg) = aggregator();
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let (start, end) = day_bounds(date, &tz);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 6, 9, 22, 0, 0).unwrap());

        insert(&db, start - TimeDelta::seconds(1), 3000);
        insert(&db, start, 1500);
        insert(&db, start + TimeDelta::hours(5), 1530);
        insert(&db, end, 1500);

        // 3030s = 50.5 minutes, truncated.
        assert_eq!(agg.focus_minutes_on(date, &tz).unwrap(), 50);
        assert_eq!(agg.session_count_on(date, &tz).unwrap(), 2);
    }

    #[test]
    fn summary_for_95_of_120_minutes() {
        let (db, agg) = aggregator();
        let tz = FixedOffset::east_opt(0).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let (start, _) = day_bounds(date, &tz);
        insert(&db, start + TimeDelta::hours(9), 1500);
        insert(&db, start + TimeDelta::hours(10), 1500);
        insert(&db, start + TimeDelta::hours(11), 1500);
        insert(&db, start + TimeDelta::hours(12), 1200);

        let summary = agg.summary_on(date, &tz).unwrap();
        assert_eq!(summary.focus_minutes, 95);
        assert_eq!(summary.session_count, 4);
        assert_eq!(summary.goal_minutes, 120);
        assert!((summary.progress - 95.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn progress_clamps_at_one() {
        let goal = DailyGoal::new(60).unwrap();
        assert_eq!(goal_progress(0, goal), 0.0);
        assert_eq!(goal_progress(30, goal), 0.5);
        assert_eq!(goal_progress(600, goal), 1.0);
    }

    #[test]
    fn goal_deserialization_validates() {
        assert!(serde_json::from_str::<DailyGoal>("0").is_err());
        assert_eq!(serde_json::from_str::<DailyGoal>("45").unwrap().minutes(), 45);
    }

    proptest! {
        #[test]
        fn progress_is_clamped_and_monotonic(
            a in 0u64..10_000,
            b in 0u64..10_000,
            goal in 1i64..1_000,
        ) {
            let goal = DailyGoal::new(goal).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = goal_progress(lo, goal);
            let p_hi = goal_progress(hi, goal);
            prop_assert!((0.0..=1.0).contains(&p_lo));
            prop_assert!((0.0..=1.0).contains(&p_hi));
            prop_assert!(p_lo <= p_hi);
        }

        #[test]
        fn minutes_are_floor_of_total_seconds(
            durations in proptest::collection::vec(60u64..=7_200, 0..20),
        ) {
            let total: u64 = durations.iter().sum();
            let minutes = secs_to_minutes(total);
            prop_assert!(minutes * 60 <= total);
            prop_assert!(total < (minutes + 1) * 60);
        }
    }
}
