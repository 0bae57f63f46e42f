use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which interval the timer is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Work,
    Break,
}

/// Configured lengths of the work and break intervals, in whole seconds.
///
/// Both values are always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDurations {
    work_secs: u64,
    break_secs: u64,
}

impl TimerDurations {
    pub const DEFAULT_WORK_SECS: u64 = 25 * 60;
    pub const DEFAULT_BREAK_SECS: u64 = 5 * 60;
    /// Upper bound for either interval.
    pub const MAX_SECS: u64 = 24 * 60 * 60;

    /// # Errors
    /// Returns a validation error if either duration is zero or longer than a day.
    pub fn new(work_secs: u64, break_secs: u64) -> Result<Self, ValidationError> {
        check_interval("work_secs", work_secs)?;
        check_interval("break_secs", break_secs)?;
        Ok(Self {
            work_secs,
            break_secs,
        })
    }

    /// Build from minute values, as stored in the config file.
    ///
    /// Uses saturating arithmetic so absurd values cannot overflow.
    pub fn from_minutes(work_min: u64, break_min: u64) -> Result<Self, ValidationError> {
        Self::new(work_min.saturating_mul(60), break_min.saturating_mul(60))
    }

    pub fn work_secs(&self) -> u64 {
        self.work_secs
    }

    pub fn break_secs(&self) -> u64 {
        self.break_secs
    }
}

fn check_interval(field: &str, secs: u64) -> Result<(), ValidationError> {
    let message = if secs == 0 {
        "must be > 0"
    } else if secs > TimerDurations::MAX_SECS {
        "must be at most 24 hours"
    } else {
        return Ok(());
    };
    Err(ValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    })
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            work_secs: Self::DEFAULT_WORK_SECS,
            break_secs: Self::DEFAULT_BREAK_SECS,
        }
    }
}
