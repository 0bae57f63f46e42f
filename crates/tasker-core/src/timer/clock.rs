use chrono::{DateTime, Utc};

/// Source of wall-clock "now" used for session timestamps.
///
/// Elapsed time is never derived from the clock; it comes from counted ticks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
