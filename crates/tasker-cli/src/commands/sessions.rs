use clap::Subcommand;
use tasker_core::Database;

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List recorded focus sessions, newest first
    List {
        /// Maximum number of sessions
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

pub fn run(action: SessionsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionsAction::List { limit } => {
            let sessions = db.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }
    Ok(())
}
