//! Timer-driven polling.
//!
//! Each source gets its own recurring timer on a shared tokio runtime.  The
//! first tick fires after a random delay inside [`JITTER_WINDOW`], every later
//! tick exactly one interval after the previous one.  Ticks are handed to the
//! runtime's blocking pool, so a slow upstream ties up one worker thread and
//! never the timers themselves.
//!
//! ## For contributors
//!
//! The scheduler knows nothing about fetching.  It calls a [`Tick`] callback
//! and it is the callback's job (see [`crate::node`]) to pass through the
//! [`FetchGate`](crate::gate::FetchGate).

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::config::{validate_interval, JITTER_WINDOW};
use crate::error::ConfigError;

/// Callback run on every tick and on every forced run.
pub type Tick = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe source of initial-delay jitter.
///
/// Staggers the first tick of timers that share an interval so they don't
/// all hit the network at once after a restart.
#[derive(Debug)]
pub struct Jitter {
    window: Duration,
    rng: Mutex<StdRng>,
}

impl Jitter {
    /// Jitter in `[0, window)` seeded from OS entropy.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic jitter, for reproducible schedules.
    pub fn seeded(window: Duration, seed: u64) -> Self {
        Self {
            window,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The process-wide instance with the default window.
    pub fn shared() -> Arc<Jitter> {
        static SHARED: OnceLock<Arc<Jitter>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Jitter::new(JITTER_WINDOW))))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Draw a delay uniformly from `[0, window)` at millisecond resolution.
    pub fn next_delay(&self) -> Duration {
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.gen_range(0..window_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Scheduled,
}

/// One source's timer.
///
/// `start` (re)arms, `stop` disarms, `force` runs the callback out of band.
/// Disarming never interrupts a callback that is already running.
pub struct PollScheduler {
    handle: Handle,
    jitter: Arc<Jitter>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("state", &self.state())
            .finish()
    }
}

impl PollScheduler {
    pub fn new(handle: Handle) -> Self {
        Self::with_jitter(handle, Jitter::shared())
    }

    pub fn with_jitter(handle: Handle, jitter: Arc<Jitter>) -> Self {
        Self {
            handle,
            jitter,
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        match timer.as_ref() {
            Some(task) if !task.is_finished() => SchedulerState::Scheduled,
            _ => SchedulerState::Stopped,
        }
    }

    /// Arm the timer: first tick after a fresh jitter delay, then every
    /// `period`.  Re-arms from scratch if already scheduled.
    pub fn start(&self, period: Duration, tick: Tick) -> Result<Duration, ConfigError> {
        let period = validate_interval(period)?;
        let delay = self.jitter.next_delay();

        let task = self.handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + delay, period);
            loop {
                ticker.tick().await;
                let tick = Arc::clone(&tick);
                // Detached: disarming the timer must not cancel a running cycle.
                drop(tokio::task::spawn_blocking(move || tick()));
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.replace(task) {
            previous.abort();
        }
        debug!(?delay, ?period, "timer armed");
        Ok(delay)
    }

    /// Disarm the timer.  Returns whether it was armed.
    pub fn stop(&self) -> bool {
        let task = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => {
                task.abort();
                debug!("timer disarmed");
                true
            }
            None => false,
        }
    }

    /// Run `tick` once on the blocking pool, leaving the timer untouched.
    pub fn force(&self, tick: Tick) {
        drop(self.handle.spawn_blocking(move || tick()));
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
