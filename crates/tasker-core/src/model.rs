//! Persisted records: tasks and focus sessions.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::WorkCompleted;
use crate::timer::MIN_SESSION_SECS;

/// Opaque task identifier, assigned by the store.
pub type TaskId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    /// Set iff `done`.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A recorded work interval. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: i64,
    /// Cleared when the task is deleted.
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// A focus session ready to insert.
///
/// Timestamps are whole UTC seconds and `ended_at - started_at` always equals
/// `duration_secs`, which is at least [`MIN_SESSION_SECS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFocusSession {
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl NewFocusSession {
    /// Normalize a completion event into a storable session.
    ///
    /// The end is truncated to the second and the start is derived from the
    /// reported duration. The reported start is ignored, so a wall clock that
    /// stepped backwards during the interval still yields a valid session.
    ///
    /// # Errors
    /// Returns a validation error if the duration is below the session minimum.
    pub fn from_completed(completed: &WorkCompleted) -> Result<Self, ValidationError> {
        if completed.duration_secs < MIN_SESSION_SECS {
            return Err(ValidationError::InvalidValue {
                field: "duration_secs".into(),
                message: format!(
                    "{} is below the {MIN_SESSION_SECS}s session minimum",
                    completed.duration_secs
                ),
            });
        }
        let duration = i64::try_from(completed.duration_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "duration_secs".into(),
                message: "out of range".into(),
            })?;

        let ended_at = truncate_to_second(completed.ended_at);
        Ok(Self {
            task_id: completed.task_id,
            started_at: ended_at - duration,
            ended_at,
            duration_secs: completed.duration_secs,
        })
    }
}

fn truncate_to_second(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::seconds(1)).unwrap_or(at)
}
