use std::sync::Arc;

use clap::Subcommand;
use tasker_core::{DailyAggregator, Database};

#[derive(Subcommand)]
pub enum GoalAction {
    /// Print the daily focus goal in minutes
    Get,
    /// Set the daily focus goal
    Set {
        /// Minutes, greater than zero
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
}

pub fn run(action: GoalAction) -> Result<(), Box<dyn std::error::Error>> {
    let aggregator = DailyAggregator::new(Arc::new(Database::open()?));

    match action {
        GoalAction::Get => {
            println!("{}", aggregator.goal()?.minutes());
        }
        GoalAction::Set { minutes } => {
            let goal = aggregator.set_goal(minutes)?;
            println!("daily goal set to {} minutes", goal.minutes());
        }
    }
    Ok(())
}
