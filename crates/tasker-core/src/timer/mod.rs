mod clock;
mod durations;
mod engine;

pub use clock::{Clock, SystemClock};
pub use durations::{Mode, TimerDurations};
pub use engine::{TimerEngine, TimerSnapshot, TimerState, MIN_SESSION_SECS};
