mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, LoggingConfig, TimerConfig};
pub use database::{Database, DAILY_GOAL_KEY, DEFAULT_DAILY_GOAL_MINUTES};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// Resolution order:
/// - `TASKER_DATA_DIR`, used verbatim (tests point this at a temp dir)
/// - `~/.config/tasker-dev/` when `TASKER_ENV=dev`
/// - `~/.config/tasker/`
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("TASKER_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TASKER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tasker-dev")
            } else {
                base_dir.join("tasker")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
