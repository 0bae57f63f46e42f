use std::sync::Arc;

use clap::Subcommand;
use tasker_core::{DailyAggregator, Database};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's focus minutes, session count and goal progress
    Today,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    let aggregator = DailyAggregator::new(db);

    match action {
        StatsAction::Today => {
            let summary = aggregator.summary()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
