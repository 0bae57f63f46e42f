use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::model::TaskId;
use crate::timer::TimerSnapshot;

/// A finished work interval, handed to observers for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCompleted {
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Every notification the timer engine produces.
/// The CLI prints these; other consumers receive them through [`EventChannel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Tick {
        snapshot: TimerSnapshot,
    },
    StateChanged {
        snapshot: TimerSnapshot,
    },
    WorkCompleted {
        #[serde(flatten)]
        completed: WorkCompleted,
    },
}

/// Receives timer notifications.
///
/// The engine never holds its state lock while calling these, so an
/// implementation may call back into the engine.
pub trait TimerObserver: Send + Sync {
    fn on_tick(&self, _snapshot: &TimerSnapshot) {}

    fn on_state_changed(&self, _snapshot: &TimerSnapshot) {}

    fn on_work_completed(&self, _completed: &WorkCompleted) {}
}

impl Event {
    /// Deliver this event to the matching observer method.
    pub fn deliver(&self, observer: &dyn TimerObserver) {
        match self {
            Event::Tick { snapshot } => observer.on_tick(snapshot),
            Event::StateChanged { snapshot } => observer.on_state_changed(snapshot),
            Event::WorkCompleted { completed } => observer.on_work_completed(completed),
        }
    }
}

/// Observer that forwards every notification into an mpsc channel.
pub struct EventChannel {
    tx: UnboundedSender<Event>,
}

impl EventChannel {
    pub fn new(tx: UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: Event) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl TimerObserver for EventChannel {
    fn on_tick(&self, snapshot: &TimerSnapshot) {
        self.forward(Event::Tick {
            snapshot: snapshot.clone(),
        });
    }

    fn on_state_changed(&self, snapshot: &TimerSnapshot) {
        self.forward(Event::StateChanged {
            snapshot: snapshot.clone(),
        });
    }

    fn on_work_completed(&self, completed: &WorkCompleted) {
        self.forward(Event::WorkCompleted {
            completed: completed.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_completed_serializes_flat_with_tag() {
        let at = Utc::now();
        let event = Event::WorkCompleted {
            completed: WorkCompleted {
                task_id: Some(42),
                started_at: at,
                ended_at: at,
                duration_secs: 90,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "work_completed");
        assert_eq!(json["task_id"], 42);
        assert_eq!(json["duration_secs"], 90);
    }

    #[test]
    fn channel_survives_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let channel = EventChannel::new(tx);
        let at = Utc::now();
        channel.on_work_completed(&WorkCompleted {
            task_id: None,
            started_at: at,
            ended_at: at,
            duration_secs: 60,
        });
    }
}
