//! Pipeline composer.
//!
//! The [`Pipeline`] owns every interceptor, both caches and the store-apply
//! function, and runs as a single task:
//! - Receives events from its inbound channel and runs them through
//!   error containment -> debounce -> shrink -> batch -> store
//! - Sleeps towards the earliest debounce or batch deadline and resumes
//!   the held events at the stage that held them
//! - Sweeps the caches with a configurable probability after each
//!   successful store-apply
//! - Discards all held work and clears its caches when disposed
//!
//! Nothing outside the task can reach the caches, the pending-debounce map
//! or the batch queue.

use crate::config::{ConfigError, KindClassifier, PipelineConfig};
use crate::error::{DispatchError, PipelineError};
use crate::events::{Event, EventReceiver, EventSender, event_channel};
use crate::interceptors::{
    BatchAggregator, DebounceGate, DebounceOutcome, DevLogger, ErrorContainment, FailureContext,
    PayloadShrinker, ShrinkOutcome,
};
use crate::store::{RandomSampler, StoreApply, SweepSampler};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters published by the pipeline task after each unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Events taken from the inbound channel.
    pub received: u64,
    /// Events that reached store-apply successfully.
    pub forwarded: u64,
    /// Debounced events discarded or replaced by an earlier pending one.
    pub coalesced: u64,
    /// Events that went through the batch queue.
    pub batched: u64,
    pub truncated: u64,
    pub optimized: u64,
    /// Contained failures.
    pub errors: u64,
    /// Cache sweeps performed.
    pub sweeps: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    config: PipelineConfig,
    store: Box<dyn StoreApply>,
    sampler: Box<dyn SweepSampler>,
    classifier: KindClassifier,
    debounce: DebounceGate,
    shrinker: PayloadShrinker,
    batch: BatchAggregator,
    containment: ErrorContainment,
    stats: PipelineStats,
    stats_tx: watch::Sender<PipelineStats>,
}

impl Pipeline {
    /// Build a pipeline in front of `store`.
    pub fn new(store: impl StoreApply, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (stats_tx, _) = watch::channel(PipelineStats::default());
        Ok(Self {
            classifier: KindClassifier::from_config(&config),
            debounce: DebounceGate::from_config(&config),
            shrinker: PayloadShrinker::from_config(&config),
            batch: BatchAggregator::from_config(&config),
            containment: ErrorContainment::from_config(&config),
            store: Box::new(store),
            sampler: Box::new(RandomSampler),
            stats: PipelineStats::default(),
            stats_tx,
            config,
        })
    }

    /// Install the development-mode diagnostic sink.
    pub fn with_dev_logger(mut self, logger: impl DevLogger) -> Self {
        self.containment.set_logger(Box::new(logger));
        self
    }

    /// Replace the random source deciding when caches are swept.
    pub fn with_sampler(mut self, sampler: impl SweepSampler) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Subscribe to statistics updates.
    pub fn subscribe_stats(&self) -> watch::Receiver<PipelineStats> {
        self.stats_tx.subscribe()
    }

    /// Run until disposed or until every event sender is dropped.
    ///
    /// A closed `shutdown_rx` counts as a dispose signal.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>, mut event_rx: EventReceiver) {
        info!(
            debounce_kinds = ?self.config.debounce_kinds,
            batch_kinds = ?self.config.batch_kinds,
            mode = ?self.config.mode,
            "Pipeline started"
        );

        while !*shutdown_rx.borrow() {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                // Dispose has highest priority.
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("Pipeline dispose handle dropped");
                        break;
                    }
                }

                // A debounce or batch timer is due.
                _ = sleep_until(deadline) => {
                    self.fire_due(Instant::now());
                }

                event = event_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        info!("Pipeline event channel closed");
                        break;
                    }
                },
            }

            self.stats_tx.send_replace(self.stats);
        }

        self.dispose();
        self.stats_tx.send_replace(self.stats);
        info!("Pipeline shutdown complete");
    }

    // -- Stage wiring -------------------------------------------------------

    /// Entry point for a new event: containment around the whole chain.
    fn dispatch(&mut self, event: Event) {
        self.stats.received += 1;
        let context = self.containment.capture(&event);
        if let Err(err) = self.enter(event) {
            self.fail(context, err);
        }
    }

    fn enter(&mut self, event: Event) -> Result<(), PipelineError> {
        if event.kind.is_empty() {
            return Err(PipelineError::MissingKind);
        }

        if self.classifier.debounces(&event) {
            match self.debounce.hold(event, Instant::now())? {
                DebounceOutcome::Held => {}
                DebounceOutcome::Discarded | DebounceOutcome::Replaced => {
                    self.stats.coalesced += 1;
                }
            }
            return Ok(());
        }
        self.shrink_and_route(event)
    }

    /// Shrink, then either queue for batching or apply right away.
    fn shrink_and_route(&mut self, event: Event) -> Result<(), PipelineError> {
        let (event, outcome) = self.shrinker.shrink(event)?;
        match outcome {
            ShrinkOutcome::Unchanged => {}
            ShrinkOutcome::Truncated { .. } => self.stats.truncated += 1,
            ShrinkOutcome::Optimized { .. } => self.stats.optimized += 1,
        }

        if self.classifier.batches(&event) {
            self.batch.enqueue(event, Instant::now());
            self.stats.batched += 1;
            return Ok(());
        }
        self.apply(event)
    }

    fn apply(&mut self, event: Event) -> Result<(), PipelineError> {
        self.store.apply(event).map_err(PipelineError::Store)?;
        self.stats.forwarded += 1;
        self.maybe_sweep();
        Ok(())
    }

    /// Contain a failure; the synthesized event re-enters from the top.
    fn fail(&mut self, context: FailureContext, err: PipelineError) {
        self.stats.errors += 1;
        if let Some(error_event) = self.containment.contain(context, err) {
            let context = self.containment.capture(&error_event);
            if let Err(err) = self.enter(error_event) {
                self.fail(context, err);
            }
        }
    }

    // -- Timers -------------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce.next_deadline(), self.batch.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn fire_due(&mut self, now: Instant) {
        for event in self.debounce.take_due(now) {
            debug!(kind = %event.kind, "Debounce timer fired");
            let context = self.containment.capture(&event);
            if let Err(err) = self.shrink_and_route(event) {
                self.fail(context, err);
            }
        }

        let flushed = self.batch.take_due(now);
        if !flushed.is_empty() {
            debug!(count = flushed.len(), "Flushing batch");
        }
        for event in flushed {
            let context = self.containment.capture(&event);
            if let Err(err) = self.apply(event) {
                self.fail(context, err);
            }
        }
    }

    // -- Cache maintenance --------------------------------------------------

    fn maybe_sweep(&mut self) {
        if self.config.sweep_probability <= 0.0
            || self.sampler.sample() >= self.config.sweep_probability
        {
            return;
        }
        let max_age = self.config.sweep_max_age();
        let removed = self.shrinker.sweep(max_age) + self.containment.sweep(max_age);
        self.stats.sweeps += 1;
        debug!(removed, "Swept pipeline caches");
    }

    /// Cancel every timer, discard held events and clear both caches.
    fn dispose(&mut self) {
        let debounced = self.debounce.cancel_all();
        let batched = self.batch.cancel();
        self.shrinker.clear();
        self.containment.clear();
        if debounced + batched > 0 {
            info!(debounced, batched, "Discarded held events on dispose");
        }
    }
}

/// Sleep until `deadline`, or forever when no timer is armed.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Producer-side handle to a running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct PipelineHandle {
    events: EventSender,
    shutdown: Arc<watch::Sender<bool>>,
    stats: watch::Receiver<PipelineStats>,
}

impl PipelineHandle {
    /// Hand an event to the pipeline, waiting for channel capacity.
    ///
    /// Never fails: events dispatched after disposal are dropped.
    pub async fn dispatch(&self, event: Event) {
        if self.is_disposed() {
            debug!(kind = %event.kind, "Pipeline disposed, dropping event");
            return;
        }
        if let Err(mpsc::error::SendError(event)) = self.events.send(event).await {
            debug!(kind = %event.kind, "Pipeline stopped, dropping event");
        }
    }

    /// Hand an event to the pipeline without waiting.
    pub fn try_dispatch(&self, event: Event) -> Result<(), DispatchError> {
        if self.is_disposed() {
            return Err(DispatchError::Disposed(event));
        }
        self.events.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => DispatchError::Full(event),
            mpsc::error::TrySendError::Closed(event) => DispatchError::Disposed(event),
        })
    }

    /// Cancel pending timers and clear caches. Idempotent.
    pub fn dispose(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_disposed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Latest published statistics.
    pub fn stats(&self) -> PipelineStats {
        *self.stats.borrow()
    }

    /// Wait until the pipeline publishes new statistics.
    pub async fn stats_changed(&mut self) -> Result<PipelineStats, watch::error::RecvError> {
        self.stats.changed().await?;
        Ok(*self.stats.borrow_and_update())
    }
}

/// Spawn `pipeline` on the current tokio runtime.
///
/// Returns the producer handle and the task's join handle; the task ends
/// after [`PipelineHandle::dispose`] or once every handle is dropped.
pub fn spawn_pipeline(pipeline: Pipeline) -> (PipelineHandle, JoinHandle<()>) {
    let (events, event_rx) = event_channel(pipeline.config.channel_buffer);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let stats = pipeline.subscribe_stats();
    let task = tokio::spawn(pipeline.run(shutdown_rx, event_rx));
    let handle = PipelineHandle {
        events,
        shutdown: Arc::new(shutdown),
        stats,
    };
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_pipeline(config: PipelineConfig) -> (Pipeline, Arc<Mutex<Vec<Event>>>) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let pipeline = Pipeline::new(
            move |event: Event| -> anyhow::Result<()> {
                sink.lock().unwrap().push(event);
                Ok(())
            },
            config,
        )
        .unwrap();
        (pipeline, applied)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_event_applies_immediately() {
        let (mut pipeline, applied) = recording_pipeline(PipelineConfig::default());
        pipeline.dispatch(Event::new("user.SET_NAME", json!("ada")));

        assert_eq!(*applied.lock().unwrap(), vec![Event::new("user.SET_NAME", json!("ada"))]);
        assert_eq!(pipeline.stats.forwarded, 1);
        assert_eq!(pipeline.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_kind_becomes_error_event() {
        let (mut pipeline, applied) = recording_pipeline(PipelineConfig::default());
        pipeline.dispatch(Event::new("", json!(1)));

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0], Event::error_occurred("event is missing a kind", ""));
        assert_eq!(pipeline.stats.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline_is_earliest_timer() {
        let (mut pipeline, _) = recording_pipeline(PipelineConfig {
            debounce_kinds: vec!["SEARCH".into()],
            batch_kinds: vec!["UPDATE".into()],
            ..Default::default()
        });
        let t0 = Instant::now();
        pipeline.dispatch(Event::new("SEARCH", json!("a")));
        pipeline.dispatch(Event::new("UPDATE", json!(1)));

        assert_eq!(pipeline.next_deadline(), Some(t0 + pipeline.config.batch_delay()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_probability_zero_never_samples() {
        let (pipeline, _) = recording_pipeline(PipelineConfig {
            sweep_probability: 0.0,
            ..Default::default()
        });
        let mut pipeline = pipeline.with_sampler(|| -> f64 { panic!("sampler must not run") });
        pipeline.dispatch(Event::new("k", json!(null)));
        assert_eq!(pipeline.stats.sweeps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_clears_held_work() {
        let (mut pipeline, applied) = recording_pipeline(PipelineConfig {
            debounce_kinds: vec!["SEARCH".into()],
            batch_kinds: vec!["UPDATE".into()],
            ..Default::default()
        });
        pipeline.dispatch(Event::new("SEARCH", json!("a")));
        pipeline.dispatch(Event::new("UPDATE", json!(1)));
        pipeline.dispose();

        assert_eq!(pipeline.next_deadline(), None);
        pipeline.fire_due(Instant::now() + std::time::Duration::from_secs(1));
        assert!(applied.lock().unwrap().is_empty());
    }
}
