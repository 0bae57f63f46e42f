//! # Tasker Core Library
//!
//! Core logic for a task list with a work/break focus timer. The `tasker` CLI
//! is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: state machine counting down whole seconds on a
//!   background tokio task, notifying observers after each transition
//! - **Recorder**: observer that turns completed work intervals into stored
//!   focus sessions
//! - **Storage**: SQLite tasks, sessions and settings, plus TOML configuration
//! - **Stats**: daily focus totals and goal progress
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: the timer state machine
//! - [`SessionRecorder`]: persists [`WorkCompleted`] events
//! - [`Database`]: task, session and settings persistence
//! - [`DailyAggregator`]: today's focus minutes against the [`DailyGoal`]
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod model;
pub mod recorder;
pub mod stats;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{Event, EventChannel, TimerObserver, WorkCompleted};
pub use model::{FocusSession, Task, TaskId};
pub use recorder::{SessionRecorder, SessionStore};
pub use stats::{goal_progress, DailyAggregator, DailyGoal, DailySummary};
pub use storage::{Config, Database};
pub use timer::{Clock, Mode, SystemClock, TimerDurations, TimerEngine, TimerSnapshot, TimerState};
