//! Activity tracking and proactive turn scheduling.
//!
//! One periodic tick per tracker. The decision and the handler call happen
//! under the state lock and are gated on the generation captured at start, so
//! once [`ActivityTracker::stop`] returns no action can fire.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Activity observed on either side of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ActivitySignal {
    UserSpeaking,
    AgentSpeaking,
}

/// Synthetic turn requested by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ProactiveAction {
    /// Fired once, when nothing has happened since start.
    Greeting,
    /// Fired on every tick after a quiet interval.
    InactiveNudge,
}

/// Receives proactive actions. Runs under the tracker lock, so it must not
/// call back into the tracker.
pub type ActionHandler = Arc<dyn Fn(ProactiveAction) + Send + Sync>;

#[derive(Debug)]
struct TrackerState {
    generation: u64,
    running: bool,
    started_at: Instant,
    last_active: Instant,
    signalled: bool,
    greeted: bool,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl TrackerState {
    fn decide(&mut self, interval: Duration, now: Instant) -> Option<ProactiveAction> {
        if !self.signalled && !self.greeted {
            self.greeted = true;
            return Some(ProactiveAction::Greeting);
        }
        if now.duration_since(self.last_active) > interval {
            return Some(ProactiveAction::InactiveNudge);
        }
        None
    }
}

#[derive(Clone)]
pub struct ActivityTracker {
    interval: Duration,
    handler: ActionHandler,
    state: Arc<Mutex<TrackerState>>,
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ActivityTracker {
    pub fn new(interval: Duration, handler: ActionHandler) -> Self {
        let now = Instant::now();
        Self {
            interval,
            handler,
            state: Arc::new(Mutex::new(TrackerState {
                generation: 0,
                running: false,
                started_at: now,
                last_active: now,
                signalled: false,
                greeted: false,
                cancel: None,
                task: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Start ticking. No-op when already running. Must be called from a
    /// tokio runtime.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            return;
        }
        let now = Instant::now();
        state.generation += 1;
        state.running = true;
        state.started_at = now;
        state.last_active = now;
        state.signalled = false;
        state.greeted = false;

        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        state.task = Some(tokio::spawn(run_ticks(
            self.clone(),
            state.generation,
            cancel,
        )));
        tracing::debug!(interval = ?self.interval, "activity tracker started");
    }

    /// Stop ticking. No-op when not running.
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.running {
            return;
        }
        state.running = false;
        state.generation += 1;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }
        tracing::debug!("activity tracker stopped");
    }

    /// Record activity; resets the quiet timer.
    pub fn signal(&self, signal: ActivitySignal) {
        let mut state = self.lock();
        if !state.running {
            return;
        }
        state.signalled = true;
        state.last_active = Instant::now();
        tracing::trace!(%signal, "activity");
    }

    fn tick(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if !state.running || state.generation != generation {
            return false;
        }
        if let Some(action) = state.decide(self.interval, Instant::now()) {
            tracing::debug!(%action, since_start = ?state.started_at.elapsed(), "proactive action");
            (self.handler)(action);
        }
        true
    }
}

async fn run_ticks(tracker: ActivityTracker, generation: u64, cancel: CancellationToken) {
    let period = tracker.interval;
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                if !tracker.tick(generation) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recording_tracker() -> (ActivityTracker, Arc<Mutex<Vec<ProactiveAction>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let tracker = ActivityTracker::new(
            Duration::from_secs(10),
            Arc::new(move |action| sink.lock().unwrap().push(action)),
        );
        (tracker, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_session_greets_once_then_nudges() {
        let (tracker, fired) = recording_tracker();
        tracker.start();

        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(*fired.lock().unwrap(), vec![ProactiveAction::Greeting]);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            *fired.lock().unwrap(),
            vec![ProactiveAction::Greeting, ProactiveAction::InactiveNudge]
        );
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn early_activity_skips_the_greeting() {
        let (tracker, fired) = recording_tracker();
        tracker.start();

        time::sleep(Duration::from_secs(5)).await;
        tracker.signal(ActivitySignal::UserSpeaking);
        time::sleep(Duration::from_millis(5_500)).await;
        assert!(fired.lock().unwrap().is_empty());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![ProactiveAction::InactiveNudge]);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_any_later_action() {
        let (tracker, fired) = recording_tracker();
        tracker.start();
        tracker.start();
        time::sleep(Duration::from_secs(9)).await;
        tracker.stop();
        tracker.stop();

        time::sleep(Duration::from_secs(60)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert!(!tracker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_greets_again() {
        let (tracker, fired) = recording_tracker();
        tracker.start();
        time::sleep(Duration::from_millis(10_500)).await;
        tracker.stop();
        tracker.start();
        time::sleep(Duration::from_millis(10_500)).await;
        tracker.stop();

        assert_eq!(
            *fired.lock().unwrap(),
            vec![ProactiveAction::Greeting, ProactiveAction::Greeting]
        );
    }
}
