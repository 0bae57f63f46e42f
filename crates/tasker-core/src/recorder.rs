//! Persists completed work intervals as focus sessions.
//!
//! The recorder is a [`TimerObserver`]. Storage failures are logged and counted
//! and never reach the timer. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{DatabaseError, Result};
use crate::events::{TimerObserver, WorkCompleted};
use crate::model::{NewFocusSession, TaskId};
use crate::timer::MIN_SESSION_SECS;

/// What the recorder needs from storage.
pub trait SessionStore: Send + Sync {
    fn task_exists(&self, id: TaskId) -> Result<bool, DatabaseError>;

    fn insert_session(&self, session: &NewFocusSession) -> Result<i64, DatabaseError>;
}

pub struct SessionRecorder<S: ?Sized> {
    store: Arc<S>,
    failed: AtomicU64,
}

impl<S: SessionStore + ?Sized> SessionRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            failed: AtomicU64::new(0),
        }
    }

    /// Number of completions that could not be stored.
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Store one completion.
    ///
    /// Returns `Ok(None)` when the interval is too short to count.
    ///
    /// # Errors
    /// Returns the validation or storage error that prevented the insert.
    pub fn record(&self, completed: &WorkCompleted) -> Result<Option<i64>> {
        if completed.duration_secs < MIN_SESSION_SECS {
            debug!(
                duration_secs = completed.duration_secs,
                "completion under a minute not recorded"
            );
            return Ok(None);
        }

        let mut session = NewFocusSession::from_completed(completed)?;
        if let Some(task_id) = session.task_id {
            if !self.store.task_exists(task_id)? {
                warn!(task_id, "task deleted while timer ran, recording without task");
                session.task_id = None;
            }
        }

        let id = self.store.insert_session(&session)?;
        info!(
            session_id = id,
            task_id = ?session.task_id,
            duration_secs = session.duration_secs,
            "focus session recorded"
        );
        Ok(Some(id))
    }
}

impl<S: SessionStore + ?Sized> TimerObserver for SessionRecorder<S> {
    fn on_work_completed(&self, completed: &WorkCompleted) {
        if let Err(e) = self.record(completed) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                error = %e,
                task_id = ?completed.task_id,
                duration_secs = completed.duration_secs,
                "failed to record focus session"
            );
        }
    }
}
