//! A poll target wired to its timer, gate, sequencer and sinks.
//!
//! [`Node`] is what the host holds for each configured source.  Every way a
//! cycle can start (timer tick, [`force`](Node::force), [`run_now`](Node::run_now))
//! goes through the same guarded entry point, so two cycles of one node never
//! overlap and never interleave their output.
//!
//! ```text
//!  tick / force ──► FetchGate ──► AnnounceSequencer ──► Sink
//!                       │               │
//!                  busy: drop     error: Reporter
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::announce::AnnounceSequencer;
use crate::config::{validate_interval, SourceConfig};
use crate::error::{ConfigError, CycleError};
use crate::gate::FetchGate;
use crate::poll::{Jitter, PollScheduler, SchedulerState, Tick};
use crate::sink::{Reporter, Sink};
use crate::source::{DataSource, KeyOf};
use crate::watermark::{Key, Watermark};

/// Result of one guarded cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already running; this trigger was dropped.
    Dropped,
    /// Nothing newer than the watermark.
    Empty,
    Announced { count: usize },
}

struct Shared<S: DataSource> {
    id: String,
    source: S,
    sink: Box<dyn Sink<S::Item>>,
    reporter: Reporter,
    gate: FetchGate,
    sequencer: Mutex<AnnounceSequencer<KeyOf<S>>>,
    reset_requested: AtomicBool,
    enabled: AtomicBool,
    interval_secs: AtomicU64,
}

impl<S: DataSource> Shared<S> {
    fn tick(self: &Arc<Self>) -> Tick {
        let shared = Arc::clone(self);
        Arc::new(move || {
            let _ = shared.run_cycle();
        })
    }

    /// The single guarded entry point.  Failures are reported here and
    /// never propagate into the timer.
    fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let Some(_guard) = self.gate.try_enter() else {
            debug!(node = %self.id, "cycle already running; dropping trigger");
            return Ok(CycleOutcome::Dropped);
        };

        let result = self.announce();
        match &result {
            Ok(CycleOutcome::Announced { count }) => {
                info!(node = %self.id, count, "announced new items");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(node = %self.id, error = %err.chain(), "cycle failed");
                self.reporter.report(&self.id, err);
            }
        }
        result
    }

    fn announce(&self) -> Result<CycleOutcome, CycleError> {
        let mut sequencer = self.sequencer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.reset_requested.swap(false, Ordering::AcqRel) {
            info!(node = %self.id, "watermark reset; replaying backlog");
            sequencer.reset();
        }

        let run = catch_unwind(AssertUnwindSafe(|| {
            sequencer.run(
                |since| self.source.fetch(since),
                |item, first_run| self.sink.deliver(item, first_run),
            )
        }));

        match run {
            Ok(Ok(0)) => Ok(CycleOutcome::Empty),
            Ok(Ok(count)) => {
                debug!(
                    node = %self.id,
                    watermark = ?sequencer.watermark().last(),
                    "watermark advanced"
                );
                Ok(CycleOutcome::Announced { count })
            }
            Ok(Err(err)) => Err(err),
            Err(payload) => Err(CycleError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Node`]; start with [`Node::builder`].
pub struct NodeBuilder<S: DataSource> {
    config: SourceConfig,
    source: S,
    sequencer: AnnounceSequencer<KeyOf<S>>,
    reporter: Reporter,
    jitter: Option<Arc<Jitter>>,
}

impl<S: DataSource> NodeBuilder<S> {
    /// Per-source-type watermark margin, see [`AnnounceSequencer::with_margin`].
    pub fn margin(mut self, margin: <KeyOf<S> as Key>::Margin) -> Self {
        self.sequencer = self.sequencer.with_margin(margin);
        self
    }

    /// Resume from a persisted watermark.
    pub fn watermark(mut self, watermark: Watermark<KeyOf<S>>) -> Self {
        self.sequencer = self.sequencer.with_watermark(watermark);
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn jitter(mut self, jitter: Arc<Jitter>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Finish the node.  The timer is not armed until [`Node::update`].
    pub fn build(
        self,
        sink: impl Sink<S::Item> + 'static,
        handle: Handle,
    ) -> Result<Node<S>, ConfigError> {
        let interval = self.config.interval()?;
        let scheduler = match self.jitter {
            Some(jitter) => PollScheduler::with_jitter(handle, jitter),
            None => PollScheduler::new(handle),
        };
        Ok(Node {
            shared: Arc::new(Shared {
                id: self.config.id,
                source: self.source,
                sink: Box::new(sink),
                reporter: self.reporter,
                gate: FetchGate::new(),
                sequencer: Mutex::new(self.sequencer),
                reset_requested: AtomicBool::new(false),
                enabled: AtomicBool::new(self.config.enabled),
                interval_secs: AtomicU64::new(interval.as_secs()),
            }),
            scheduler,
        })
    }
}

/// One configured source, ready to be scheduled.
///
/// Dropping the node disarms its timer; a cycle already in flight runs to
/// completion on its worker thread.
pub struct Node<S: DataSource> {
    shared: Arc<Shared<S>>,
    scheduler: PollScheduler,
}

impl<S: DataSource> Node<S> {
    pub fn builder(config: SourceConfig, source: S) -> NodeBuilder<S> {
        let sequencer = AnnounceSequencer::new(config.first_run);
        NodeBuilder {
            config,
            source,
            sequencer,
            reporter: Reporter::silent(),
            jitter: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Flip the enabled flag.  Takes effect on the next [`update`](Self::update).
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.shared.interval_secs.load(Ordering::Acquire))
    }

    /// Change the poll interval.  A running timer is re-armed; an in-flight
    /// cycle is unaffected.
    pub fn set_interval(&self, interval: Duration) -> Result<(), ConfigError> {
        let interval = validate_interval(interval)?;
        self.shared
            .interval_secs
            .store(interval.as_secs(), Ordering::Release);
        if self.state() == SchedulerState::Scheduled {
            self.start()?;
        }
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Whether a cycle is in flight right now.
    pub fn is_busy(&self) -> bool {
        self.shared.gate.is_busy()
    }

    /// Arm the timer if the node is enabled, re-arming if already armed.
    pub fn start(&self) -> Result<SchedulerState, ConfigError> {
        if !self.is_enabled() {
            return Ok(self.state());
        }
        let delay = self.scheduler.start(self.interval(), self.shared.tick())?;
        info!(node = %self.id(), ?delay, interval = ?self.interval(), "node started");
        Ok(SchedulerState::Scheduled)
    }

    pub fn stop(&self) -> bool {
        let was_armed = self.scheduler.stop();
        if was_armed {
            info!(node = %self.id(), "node stopped");
        }
        was_armed
    }

    /// Reconcile the timer with the configuration: run while enabled and
    /// valid, stay stopped otherwise.  Safe to call after any edit.
    pub fn update(&self) -> SchedulerState {
        if !(self.is_enabled() && self.shared.source.is_valid()) {
            self.stop();
            return SchedulerState::Stopped;
        }
        if self.state() == SchedulerState::Scheduled {
            return SchedulerState::Scheduled;
        }
        match self.start() {
            Ok(state) => state,
            Err(err) => {
                warn!(node = %self.id(), error = %err, "cannot schedule node");
                SchedulerState::Stopped
            }
        }
    }

    /// Run a cycle now on a worker thread, independent of the timer.
    pub fn force(&self) {
        self.scheduler.force(self.shared.tick());
    }

    /// Run a guarded cycle on the calling thread.
    ///
    /// Failures are reported to the error sink as for a timer tick, and also
    /// returned.
    pub fn run_now(&self) -> Result<CycleOutcome, CycleError> {
        self.shared.run_cycle()
    }

    /// Request a watermark and first-run reset.
    ///
    /// Applied at the start of the next admitted cycle, so an in-flight cycle
    /// is never disturbed.
    pub fn reset(&self) {
        self.shared.reset_requested.store(true, Ordering::Release);
    }

    /// Reset, then force a cycle: re-fetch the whole backlog now.
    pub fn test(&self) {
        self.reset();
        self.force();
    }

    /// Snapshot of the watermark, for persistence.
    ///
    /// Waits for an in-flight cycle to finish.
    pub fn watermark(&self) -> Watermark<KeyOf<S>> {
        self.shared
            .sequencer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watermark()
            .clone()
    }

    /// Waits for an in-flight cycle to finish.
    pub fn is_first_run(&self) -> bool {
        self.shared
            .sequencer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_first_run()
    }
}

/// Type-erased view of a [`Node`], for managing heterogeneous sources.
pub trait ManagedNode: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> &str;
    fn target(&self) -> &str;
    fn interval(&self) -> Duration;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn state(&self) -> SchedulerState;
    fn update(&self) -> SchedulerState;
    fn stop(&self) -> bool;
    fn force(&self);
    fn reset(&self);

    /// `Feed - http://example.com/rss (3600)`
    fn short_description(&self) -> String {
        format!(
            "{} - {} ({})",
            self.kind(),
            self.target(),
            self.interval().as_secs()
        )
    }

    /// `[*] Feed - http://example.com/rss (3600)`, `[ ]` when disabled.
    fn long_description(&self) -> String {
        let mark = if self.is_enabled() { "*" } else { " " };
        format!("[{mark}] {}", self.short_description())
    }
}

impl<S: DataSource> ManagedNode for Node<S> {
    fn id(&self) -> &str {
        Node::id(self)
    }

    fn kind(&self) -> &str {
        self.shared.source.kind()
    }

    fn target(&self) -> &str {
        self.shared.source.name()
    }

    fn interval(&self) -> Duration {
        Node::interval(self)
    }

    fn is_enabled(&self) -> bool {
        Node::is_enabled(self)
    }

    fn set_enabled(&self, enabled: bool) {
        Node::set_enabled(self, enabled)
    }

    fn state(&self) -> SchedulerState {
        Node::state(self)
    }

    fn update(&self) -> SchedulerState {
        Node::update(self)
    }

    fn stop(&self) -> bool {
        Node::stop(self)
    }

    fn force(&self) {
        Node::force(self)
    }

    fn reset(&self) {
        Node::reset(self)
    }
}
