mod events;

pub use events::{EventSink, Outcome, RunReport, StepEvent, Tally};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Longest a cancellable wait sleeps before re-checking the run flag.
pub const POLL_SLICE: Duration = Duration::from_millis(100);

/// Lifecycle of a worker or scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

struct Inner {
    state: Mutex<RunState>,
    signal: Condvar,
    watch: watch::Sender<RunState>,
}

/// Cooperative cancellation token shared between the controlling side and
/// the worker.
///
/// `Idle -> Running` on [`start`](Self::start), `Running -> Stopping` on
/// [`request_stop`](Self::request_stop), back to `Idle` on
/// [`finish`](Self::finish). Workers poll [`is_cancelled`](Self::is_cancelled)
/// at loop boundaries and use [`wait`](Self::wait) for interruptible pauses.
#[derive(Clone)]
pub struct RunControl {
    inner: Arc<Inner>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (watch, _) = watch::channel(RunState::Idle);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::Idle),
                signal: Condvar::new(),
                watch,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: &mut MutexGuard<'_, RunState>, to: RunState) {
        debug!("Run state {:?} -> {:?}", **state, to);
        **state = to;
        self.inner.watch.send_replace(to);
        self.inner.signal.notify_all();
    }

    pub fn state(&self) -> RunState {
        *self.lock()
    }

    /// Observe state changes, e.g. from an async front-end.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.watch.subscribe()
    }

    /// `Idle -> Running`. Returns false if a run is already in progress.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        if *state != RunState::Idle {
            return false;
        }
        self.set(&mut state, RunState::Running);
        true
    }

    /// `Running -> Stopping`, waking any pending [`wait`](Self::wait).
    /// Has no effect when idle or already stopping.
    pub fn request_stop(&self) {
        let mut state = self.lock();
        if *state == RunState::Running {
            self.set(&mut state, RunState::Stopping);
        }
    }

    /// True unless the run is actively `Running`.
    pub fn is_cancelled(&self) -> bool {
        *self.lock() != RunState::Running
    }

    pub fn is_stopping(&self) -> bool {
        *self.lock() == RunState::Stopping
    }

    /// Return to `Idle` from `Running` or `Stopping`.
    pub fn finish(&self) {
        let mut state = self.lock();
        if *state != RunState::Idle {
            self.set(&mut state, RunState::Idle);
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns true when the
    /// wait was cut short (or never started) because the run is not running.
    ///
    /// A duration too long to represent as a deadline waits until cancelled.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut state = self.lock();
        loop {
            if *state != RunState::Running {
                return true;
            }
            let now = Instant::now();
            let slice = match deadline {
                Some(deadline) if now >= deadline => return false,
                Some(deadline) => (deadline - now).min(POLL_SLICE),
                None => POLL_SLICE,
            };
            state = self
                .inner
                .signal
                .wait_timeout(state, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
