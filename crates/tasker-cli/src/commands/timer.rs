use std::sync::Arc;

use clap::Subcommand;
use tasker_core::{
    Config, Database, Event, EventChannel, SessionRecorder, TaskId, TimerDurations, TimerEngine,
    TimerState,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Run one work interval and its break in the foreground.
    ///
    /// Prints events as JSON lines. Ctrl-C stops early and records the work
    /// done so far if it reached a minute.
    Run {
        /// Task to attribute the work to
        #[arg(long)]
        task: Option<TaskId>,
        /// Work interval length, overriding config
        #[arg(long)]
        work_minutes: Option<u64>,
        /// Break interval length, overriding config
        #[arg(long)]
        break_minutes: Option<u64>,
    },
}

fn print_event(event: &Event) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

pub async fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Run {
            task,
            work_minutes,
            break_minutes,
        } => {
            let config = Config::load()?;
            let durations = TimerDurations::from_minutes(
                work_minutes.unwrap_or(config.timer.work_minutes),
                break_minutes.unwrap_or(config.timer.break_minutes),
            )?;
            run_timer(task, durations).await
        }
    }
}

async fn run_timer(
    task: Option<TaskId>,
    durations: TimerDurations,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    if let Some(id) = task {
        if !db.task_exists(id)? {
            return Err(format!("task {id} not found").into());
        }
    }

    let engine = TimerEngine::new(durations, Handle::current());
    let recorder = Arc::new(SessionRecorder::new(db));
    engine.subscribe(recorder.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(EventChannel::new(tx)));

    engine.start_work(task);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                engine.pause_or_stop();
                // Stopping dispatches synchronously; flush what it produced.
                while let Ok(event) = rx.try_recv() {
                    if !matches!(event, Event::Tick { .. }) {
                        print_event(&event)?;
                    }
                }
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match &event {
                    Event::Tick { snapshot } => {
                        debug!(remaining_secs = snapshot.remaining_secs, mode = ?snapshot.mode, "tick");
                    }
                    Event::StateChanged { snapshot } => {
                        print_event(&event)?;
                        if snapshot.state == TimerState::Idle {
                            break;
                        }
                    }
                    Event::WorkCompleted { .. } => print_event(&event)?,
                }
            }
        }
    }

    if recorder.failed_count() > 0 {
        warn!(
            failed = recorder.failed_count(),
            "some focus sessions could not be saved"
        );
    }
    Ok(())
}
