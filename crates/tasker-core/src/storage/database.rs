//! SQLite-based storage for tasks, focus sessions and settings.
//!
//! Provides persistent storage for:
//! - The task list
//! - Completed focus sessions (append-only)
//! - Key-value settings such as the daily goal

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, error, info};

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result, ValidationError};
use crate::model::{FocusSession, NewFocusSession, Task, TaskId};
use crate::recorder::SessionStore;

/// Settings key holding the daily focus goal in minutes.
pub const DAILY_GOAL_KEY: &str = "daily_focus_goal_minutes";
pub const DEFAULT_DAILY_GOAL_MINUTES: u32 = 120;

const DB_FILE_NAME: &str = "tasker.db";
const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

/// SQLite database shared by the timer recorder and the controller.
///
/// The connection sits behind a mutex so one handle can be used from the
/// timer's background task and the foreground at the same time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/tasker.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory, the file or the migrations fail.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join(DB_FILE_NAME);
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        info!(path = %path.display(), "opening database");
        let conn = Connection::open(path).map_err(|source| {
            error!(path = %path.display(), error = %source, "database open failed");
            DatabaseError::OpenFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn).map_err(|e| {
            error!(error = %e, "database migration failed");
            DatabaseError::MigrationFailed(e.to_string())
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("connection lock poisoned".into()))
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Add a task. The title is trimmed and must not be blank.
    pub fn add_task(&self, title: &str) -> Result<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyValue("title".into()).into());
        }
        let created_at = now_utc();
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO tasks (title, done, created_at) VALUES (?1, 0, ?2)",
                params![title, to_db_timestamp(created_at)],
            )
            .map_err(DatabaseError::from)?;
            conn.last_insert_rowid()
        };
        debug!(task_id = id, "task added");
        Ok(Task {
            id,
            title: title.to_string(),
            done: false,
            created_at,
            completed_at: None,
        })
    }

    /// All tasks, open ones first, newest first within each group.
    pub fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, done, created_at, completed_at
             FROM tasks
             ORDER BY done ASC, created_at DESC, id DESC",
        )?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, DatabaseError> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                "SELECT id, title, done, created_at, completed_at FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn task_exists(&self, id: TaskId) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
            params![id],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    /// Mark a task done (stamping `completed_at`) or open again (clearing it).
    pub fn set_task_done(&self, id: TaskId, done: bool) -> Result<Task, DatabaseError> {
        let changed = {
            let conn = self.conn()?;
            if done {
                conn.execute(
                    "UPDATE tasks SET done = 1, completed_at = ?2 WHERE id = ?1",
                    params![id, to_db_timestamp(now_utc())],
                )?
            } else {
                conn.execute(
                    "UPDATE tasks SET done = 0, completed_at = NULL WHERE id = ?1",
                    params![id],
                )?
            }
        };
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "task", id });
        }
        self.get_task(id)?
            .ok_or(DatabaseError::NotFound { entity: "task", id })
    }

    /// Delete a task. Its sessions stay, with their task reference cleared.
    pub fn delete_task(&self, id: TaskId) -> Result<(), DatabaseError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "task", id });
        }
        debug!(task_id = id, "task deleted");
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn insert_session(&self, session: &NewFocusSession) -> Result<i64, DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO focus_sessions (task_id, started_at, ended_at, duration_secs)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.task_id,
                to_db_timestamp(session.started_at),
                to_db_timestamp(session.ended_at),
                session.duration_secs,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Total seconds of sessions whose start lies in `[start, end)`.
    pub fn sum_session_secs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let conn = self.conn()?;
        let secs = conn.query_row(
            "SELECT COALESCE(SUM(duration_secs), 0) FROM focus_sessions
             WHERE started_at >= ?1 AND started_at < ?2",
            params![to_db_timestamp(start), to_db_timestamp(end)],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(secs)
    }

    /// Number of sessions whose start lies in `[start, end)`.
    pub fn count_sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM focus_sessions
             WHERE started_at >= ?1 AND started_at < ?2",
            params![to_db_timestamp(start), to_db_timestamp(end)],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: u32) -> Result<Vec<FocusSession>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, started_at, ended_at, duration_secs
             FROM focus_sessions
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;
        let sessions = stmt
            .query_map(params![limit], |row| {
                Ok(FocusSession {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    started_at: timestamp_column(row, 2)?,
                    ended_at: timestamp_column(row, 3)?,
                    duration_secs: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn setting_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn setting_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SessionStore for Database {
    fn task_exists(&self, id: TaskId) -> Result<bool, DatabaseError> {
        Database::task_exists(self, id)
    }

    fn insert_session(&self, session: &NewFocusSession) -> Result<i64, DatabaseError> {
        Database::insert_session(self, session)
    }
}

fn now_utc() -> DateTime<Utc> {
    to_db_precision(Utc::now())
}

/// Drop sub-second precision so stored and returned values agree.
fn to_db_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

/// Second-precision RFC 3339 with a `Z` suffix, so text order is time order.
pub(crate) fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let completed_at = match row.get::<_, Option<String>>(4)? {
        Some(_) => Some(timestamp_column(row, 4)?),
        None => None,
    };
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        done: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        completed_at,
    })
}
