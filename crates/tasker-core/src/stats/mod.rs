//! Focus statistics derived from recorded sessions.

mod daily;

pub use daily::{
    day_bounds, goal_progress, secs_to_minutes, DailyAggregator, DailyGoal, DailySummary,
};
