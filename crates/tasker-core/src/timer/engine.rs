//! Timer engine implementation.
//!
//! The engine owns one work/break countdown and advances it from a background
//! tokio task that ticks once per second while the timer runs.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start_work--> RunningWork --expiry--> RunningBreak --expiry--> Idle
//!   ^                      |                        |
//!   +---- pause_or_stop ---+------------------------+
//!   +---- reset (from any state) -------------------+
//! ```
//!
//! ## Locking
//!
//! All timer fields sit behind one mutex. Transitions collect the events they
//! produce while holding it and hand them to observers only after the guard is
//! dropped, so an observer may call straight back into the engine.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = TimerEngine::new(TimerDurations::default(), Handle::current());
//! engine.subscribe(Arc::new(recorder));
//! engine.start_work(Some(task_id));
//! // ... later
//! engine.pause_or_stop();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::durations::{Mode, TimerDurations};
use crate::events::{Event, TimerObserver, WorkCompleted};
use crate::model::TaskId;

/// Shortest work interval that counts as a focus session.
pub const MIN_SESSION_SECS: u64 = 60;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    RunningWork,
    RunningBreak,
}

/// Point-in-time copy of the timer, safe to hand across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub mode: Mode,
    pub remaining_secs: u64,
    pub running: bool,
    pub task_id: Option<TaskId>,
    pub started_at: Option<DateTime<Utc>>,
    pub work_secs: u64,
    pub break_secs: u64,
}

struct TimerCore {
    durations: TimerDurations,
    mode: Mode,
    remaining_secs: u64,
    running: bool,
    task_id: Option<TaskId>,
    started_at: Option<DateTime<Utc>>,
    /// Bumped every time a tick loop is spawned; stale loops compare and exit.
    generation: u64,
    /// Present exactly while a tick loop is active.
    stop_tx: Option<oneshot::Sender<()>>,
    /// Bumped on every state change. A queued state-changed event is only
    /// delivered while its number is still the latest.
    transitions: u64,
}

/// An event waiting to be handed to observers.
struct Pending {
    event: Event,
    transition: Option<u64>,
}

impl From<Event> for Pending {
    fn from(event: Event) -> Self {
        Self {
            event,
            transition: None,
        }
    }
}

impl TimerCore {
    fn new(durations: TimerDurations) -> Self {
        Self {
            durations,
            mode: Mode::Work,
            remaining_secs: durations.work_secs(),
            running: false,
            task_id: None,
            started_at: None,
            generation: 0,
            stop_tx: None,
            transitions: 0,
        }
    }

    fn state(&self) -> TimerState {
        match (self.running, self.mode) {
            (false, _) => TimerState::Idle,
            (true, Mode::Work) => TimerState::RunningWork,
            (true, Mode::Break) => TimerState::RunningBreak,
        }
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state(),
            mode: self.mode,
            remaining_secs: self.remaining_secs,
            running: self.running,
            task_id: self.task_id,
            started_at: self.started_at,
            work_secs: self.durations.work_secs(),
            break_secs: self.durations.break_secs(),
        }
    }

    fn state_changed(&mut self) -> Pending {
        self.transitions = self.transitions.wrapping_add(1);
        Pending {
            event: Event::StateChanged {
                snapshot: self.snapshot(),
            },
            transition: Some(self.transitions),
        }
    }

    /// Signal the active tick loop to stop.
    ///
    /// The sender is taken out of the option, so a loop can be signalled at most once.
    fn cancel_loop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            // A loop that already exited has dropped its receiver.
            let _ = stop.send(());
        }
    }

    /// Back to the initial shape: idle, work mode, full work duration.
    fn to_idle(&mut self) {
        self.running = false;
        self.mode = Mode::Work;
        self.remaining_secs = self.durations.work_secs();
        self.task_id = None;
        self.started_at = None;
    }
}

enum TickOutcome {
    Continue(Vec<Pending>),
    Finished(Vec<Pending>),
}

struct Shared {
    core: Mutex<TimerCore>,
    observers: RwLock<Vec<Arc<dyn TimerObserver>>>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, TimerCore> {
        // Observers run outside the lock, so a poisoned guard only means a
        // panic inside a transition; the fields are still consistent.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called without holding the core lock.
    ///
    /// An observer may cause a newer transition while this runs. State changes
    /// queued before it are then dropped, so the last state every observer
    /// sees is the engine's current one.
    fn dispatch(&self, events: Vec<Pending>) {
        if events.is_empty() {
            return;
        }
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for pending in &events {
            for observer in &observers {
                if let Some(transition) = pending.transition {
                    if self.lock_core().transitions != transition {
                        debug!(transition, "superseded state change dropped");
                        break;
                    }
                }
                pending.event.deliver(observer.as_ref());
            }
        }
    }

    fn tick(&self, generation: u64) -> TickOutcome {
        let mut core = self.lock_core();
        if !core.running || core.generation != generation {
            // Lost the race against pause/reset/restart.
            debug!(generation, "stale tick ignored");
            return TickOutcome::Finished(Vec::new());
        }

        core.remaining_secs = core.remaining_secs.saturating_sub(1);
        let mut events: Vec<Pending> = vec![Event::Tick {
            snapshot: core.snapshot(),
        }
        .into()];
        if core.remaining_secs > 0 {
            return TickOutcome::Continue(events);
        }

        let now = self.clock.now();
        match core.mode {
            Mode::Work => {
                let duration_secs = core.durations.work_secs();
                let started_at = core
                    .started_at
                    .unwrap_or_else(|| now - secs(duration_secs));
                events.push(
                    Event::WorkCompleted {
                        completed: WorkCompleted {
                            task_id: core.task_id,
                            started_at,
                            ended_at: now,
                            duration_secs,
                        },
                    }
                    .into(),
                );
                core.mode = Mode::Break;
                core.remaining_secs = core.durations.break_secs();
                core.task_id = None;
                core.started_at = Some(now);
                info!(
                    work_secs = duration_secs,
                    break_secs = core.remaining_secs,
                    "work interval finished, break started"
                );
                events.push(core.state_changed());
                TickOutcome::Continue(events)
            }
            Mode::Break => {
                // This loop is the one ending; dropping its sender is enough.
                core.stop_tx = None;
                core.to_idle();
                info!("break finished, timer idle");
                events.push(core.state_changed());
                TickOutcome::Finished(events)
            }
        }
    }
}

/// Core timer engine.
///
/// One value owns one timer. The background loop only holds a weak reference
/// to the shared state, and dropping the engine stops it.
pub struct TimerEngine {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl TimerEngine {
    /// Create an idle engine whose tick loop will run on `runtime`.
    pub fn new(durations: TimerDurations, runtime: Handle) -> Self {
        Self::with_clock(durations, Arc::new(SystemClock), runtime)
    }

    pub fn with_clock(durations: TimerDurations, clock: Arc<dyn Clock>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(TimerCore::new(durations)),
                observers: RwLock::new(Vec::new()),
                clock,
            }),
            runtime,
        }
    }

    /// Register an observer. It receives every event emitted after this call.
    pub fn subscribe(&self, observer: Arc<dyn TimerObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TimerSnapshot {
        self.shared.lock_core().snapshot()
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock_core().state()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a work interval for `task_id`.
    ///
    /// Does nothing while a work interval is already running, so elapsed time
    /// is never thrown away by a repeated start. A running break is cancelled.
    pub fn start_work(&self, task_id: Option<TaskId>) {
        let events = {
            let mut core = self.shared.lock_core();
            if core.state() == TimerState::RunningWork {
                debug!(?task_id, "work interval already running");
                return;
            }

            core.cancel_loop();
            core.mode = Mode::Work;
            core.remaining_secs = core.durations.work_secs();
            core.task_id = task_id;
            core.started_at = Some(self.shared.clock.now());
            core.running = true;
            core.generation = core.generation.wrapping_add(1);

            let (stop_tx, stop_rx) = oneshot::channel();
            core.stop_tx = Some(stop_tx);
            self.runtime.spawn(run_ticks(
                Arc::downgrade(&self.shared),
                core.generation,
                stop_rx,
            ));

            info!(?task_id, work_secs = core.remaining_secs, "work interval started");
            vec![core.state_changed()]
        };
        self.shared.dispatch(events);
    }

    /// Stop the running interval.
    ///
    /// A work interval that ran for at least [`MIN_SESSION_SECS`] is reported
    /// as completed with its elapsed time. Shorter ones are dropped silently.
    pub fn pause_or_stop(&self) {
        let events = {
            let mut core = self.shared.lock_core();
            if !core.running {
                return;
            }

            core.cancel_loop();
            core.running = false;

            let mut events: Vec<Pending> = Vec::with_capacity(2);
            if core.mode == Mode::Work {
                let elapsed = core.durations.work_secs().saturating_sub(core.remaining_secs);
                if elapsed >= MIN_SESSION_SECS {
                    let ended_at = self.shared.clock.now();
                    events.push(
                        Event::WorkCompleted {
                            completed: WorkCompleted {
                                task_id: core.task_id,
                                started_at: ended_at - secs(elapsed),
                                ended_at,
                                duration_secs: elapsed,
                            },
                        }
                        .into(),
                    );
                } else {
                    debug!(elapsed_secs = elapsed, "short work interval discarded");
                }
            }
            info!(mode = ?core.mode, remaining_secs = core.remaining_secs, "timer stopped");
            events.push(core.state_changed());
            events
        };
        self.shared.dispatch(events);
    }

    /// Abandon whatever is running and return to the initial idle state.
    ///
    /// In-progress work is never recorded, however long it ran.
    pub fn reset(&self) {
        let events = {
            let mut core = self.shared.lock_core();
            core.cancel_loop();
            core.to_idle();
            info!("timer reset");
            vec![core.state_changed()]
        };
        self.shared.dispatch(events);
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.shared.lock_core().cancel_loop();
    }
}

async fn run_ticks(shared: Weak<Shared>, generation: u64, mut stop_rx: oneshot::Receiver<()>) {
    let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                match shared.tick(generation) {
                    TickOutcome::Continue(events) => shared.dispatch(events),
                    TickOutcome::Finished(events) => {
                        shared.dispatch(events);
                        break;
                    }
                }
            }
        }
    }
    debug!(generation, "tick loop exited");
}

fn secs(n: u64) -> chrono::Duration {
    // Durations are capped at a day, far inside i64 range.
    chrono::Duration::seconds(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::OnceLock;

    #[derive(Default)]
    struct Probe {
        ticks: AtomicU64,
        changes: Mutex<Vec<TimerSnapshot>>,
        completed: Mutex<Vec<WorkCompleted>>,
    }

    impl Probe {
        fn completed(&self) -> Vec<WorkCompleted> {
            self.completed.lock().unwrap().clone()
        }

        fn changes(&self) -> Vec<TimerSnapshot> {
            self.changes.lock().unwrap().clone()
        }
    }

    impl TimerObserver for Probe {
        fn on_tick(&self, _snapshot: &TimerSnapshot) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_state_changed(&self, snapshot: &TimerSnapshot) {
            self.changes.lock().unwrap().push(snapshot.clone());
        }

        fn on_work_completed(&self, completed: &WorkCompleted) {
            self.completed.lock().unwrap().push(completed.clone());
        }
    }

    fn engine(work_secs: u64, break_secs: u64) -> (TimerEngine, Arc<Probe>) {
        let durations = TimerDurations::new(work_secs, break_secs).unwrap();
        let engine = TimerEngine::new(durations, Handle::current());
        let probe = Arc::new(Probe::default());
        engine.subscribe(probe.clone());
        (engine, probe)
    }

    /// Sleep half a second past `secs` so every tick due by then has fired.
    async fn run_for(secs: u64) {
        tokio::time::sleep(Duration::from_millis(secs * 1000 + 500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn starts_idle_with_full_work_duration() {
        let (engine, _) = engine(1500, 300);
        let snap = engine.snapshot();
        assert_eq!(snap.state, TimerState::Idle);
        assert_eq!(snap.mode, Mode::Work);
        assert_eq!(snap.remaining_secs, 1500);
        assert_eq!(snap.task_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn start_work_is_idempotent_while_running() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(Some(42));
        run_for(10).await;
        let before = engine.snapshot();

        engine.start_work(Some(7));
        let after = engine.snapshot();

        assert_eq!(before, after);
        assert_eq!(after.task_id, Some(42));
        assert_eq!(after.remaining_secs, 1490);
        assert_eq!(probe.changes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_after_ninety_seconds_reports_elapsed() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(Some(42));
        run_for(90).await;
        engine.pause_or_stop();

        let completed = probe.completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_id, Some(42));
        assert_eq!(completed[0].duration_secs, 90);
        assert_eq!(
            completed[0].ended_at - completed[0].started_at,
            chrono::Duration::seconds(90)
        );
        assert_eq!(engine.state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_under_a_minute_records_nothing() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(None);
        run_for(40).await;
        engine.pause_or_stop();

        assert!(probe.completed().is_empty());
        assert_eq!(engine.state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_at_exactly_sixty_seconds_records() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(None);
        run_for(60).await;
        engine.pause_or_stop();

        assert_eq!(probe.completed()[0].duration_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn state_changed_follows_completion_on_pause() {
        #[derive(Default)]
        struct Order(Mutex<Vec<&'static str>>);
        impl TimerObserver for Order {
            fn on_state_changed(&self, _: &TimerSnapshot) {
                self.0.lock().unwrap().push("state");
            }
            fn on_work_completed(&self, _: &WorkCompleted) {
                self.0.lock().unwrap().push("work");
            }
        }

        let (engine, _) = engine(1500, 300);
        let order = Arc::new(Order::default());
        engine.subscribe(order.clone());
        engine.start_work(None);
        run_for(75).await;
        engine.pause_or_stop();

        assert_eq!(*order.0.lock().unwrap(), vec!["state", "work", "state"]);
    }

    #[tokio::test(start_paused = true)]
    async fn natural_work_expiry_records_full_duration_then_breaks() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(Some(3));
        run_for(1500).await;

        let completed = probe.completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].duration_secs, 1500);
        assert_eq!(completed[0].task_id, Some(3));

        let snap = engine.snapshot();
        assert_eq!(snap.state, TimerState::RunningBreak);
        assert_eq!(snap.remaining_secs, 300);
        assert_eq!(snap.task_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn natural_break_expiry_goes_idle_without_session() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(None);
        run_for(1500).await;
        run_for(300).await;

        assert_eq!(probe.completed().len(), 1);
        assert_eq!(engine.state(), TimerState::Idle);
        assert_eq!(probe.ticks.load(Ordering::SeqCst), 1800);

        // Loop is gone: no more ticks arrive.
        run_for(30).await;
        assert_eq!(probe.ticks.load(Ordering::SeqCst), 1800);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_during_break_records_nothing() {
        let (engine, probe) = engine(120, 300);
        engine.start_work(None);
        run_for(180).await;
        assert_eq!(engine.state(), TimerState::RunningBreak);
        engine.pause_or_stop();

        assert_eq!(probe.completed().len(), 1);
        assert_eq!(engine.state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_long_work_interval() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(Some(9));
        run_for(600).await;
        engine.reset();

        assert!(probe.completed().is_empty());
        let snap = engine.snapshot();
        assert_eq!(snap.state, TimerState::Idle);
        assert_eq!(snap.mode, Mode::Work);
        assert_eq!(snap.remaining_secs, 1500);
        assert_eq!(snap.task_id, None);

        let ticks = probe.ticks.load(Ordering::SeqCst);
        run_for(10).await;
        assert_eq!(probe.ticks.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_when_idle_is_noop_but_reset_always_notifies() {
        let (engine, probe) = engine(1500, 300);
        engine.pause_or_stop();
        assert!(probe.changes().is_empty());
        engine.reset();
        engine.reset();
        assert_eq!(probe.changes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_may_restart_work_from_completion_callback() {
        struct Restarter {
            engine: OnceLock<Weak<TimerEngine>>,
        }
        impl TimerObserver for Restarter {
            fn on_work_completed(&self, _: &WorkCompleted) {
                if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                    engine.start_work(Some(7));
                }
            }
        }

        let durations = TimerDurations::new(120, 60).unwrap();
        let engine = Arc::new(TimerEngine::new(durations, Handle::current()));
        let restarter = Arc::new(Restarter {
            engine: OnceLock::new(),
        });
        let _ = restarter.engine.set(Arc::downgrade(&engine));
        engine.subscribe(restarter);

        engine.start_work(Some(1));
        run_for(120).await;

        let snap = engine.snapshot();
        assert_eq!(snap.state, TimerState::RunningWork);
        assert_eq!(snap.task_id, Some(7));

        assert_eq!(snap.remaining_secs, 120);

        // Exactly one loop keeps ticking.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.snapshot().remaining_secs, 110);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_from_callback_leaves_observers_with_current_state() {
        struct Restarter {
            engine: OnceLock<Weak<TimerEngine>>,
            last_state: Mutex<Option<TimerSnapshot>>,
        }
        impl TimerObserver for Restarter {
            fn on_state_changed(&self, snapshot: &TimerSnapshot) {
                *self.last_state.lock().unwrap() = Some(snapshot.clone());
            }

            fn on_work_completed(&self, _: &WorkCompleted) {
                if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                    engine.start_work(Some(7));
                }
            }
        }

        let durations = TimerDurations::new(120, 60).unwrap();
        let engine = Arc::new(TimerEngine::new(durations, Handle::current()));
        let restarter = Arc::new(Restarter {
            engine: OnceLock::new(),
            last_state: Mutex::new(None),
        });
        let _ = restarter.engine.set(Arc::downgrade(&engine));
        engine.subscribe(restarter.clone());
        let probe = Arc::new(Probe::default());
        engine.subscribe(probe.clone());

        engine.start_work(Some(1));
        run_for(120).await;

        let current = engine.snapshot();
        assert_eq!(current.state, TimerState::RunningWork);
        assert_eq!(
            restarter.last_state.lock().unwrap().as_ref(),
            Some(&current)
        );
        assert_eq!(probe.changes().last(), Some(&current));
        assert!(probe
            .changes()
            .iter()
            .all(|snap| snap.state != TimerState::RunningBreak));
    }

    #[tokio::test(start_paused = true)]
    async fn engines_do_not_interfere() {
        let (first, first_probe) = engine(100, 50);
        let (second, second_probe) = engine(200, 50);
        first.start_work(Some(1));
        run_for(20).await;
        second.start_work(Some(2));
        run_for(80).await;

        assert_eq!(first_probe.completed().len(), 1);
        assert!(second_probe.completed().is_empty());
        assert_eq!(first.state(), TimerState::RunningBreak);
        assert_eq!(second.snapshot().remaining_secs, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_engine_stops_ticking() {
        let (engine, probe) = engine(1500, 300);
        engine.start_work(None);
        run_for(5).await;
        drop(engine);
        run_for(5).await;
        assert_eq!(probe.ticks.load(Ordering::SeqCst), 5);
    }
}
