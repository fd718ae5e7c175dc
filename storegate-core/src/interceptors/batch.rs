//! Batch aggregator.
//!
//! Queues batchable events and releases them together once the stream has
//! been quiet for the batch delay. Every enqueue pushes the flush deadline
//! out again, so a steady burst keeps extending the window.

use crate::config::PipelineConfig;
use crate::events::Event;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Queued events and their flush deadline. Only exists while non-empty, so
/// a populated queue always has a scheduled flush.
#[derive(Debug)]
struct BatchQueue {
    events: Vec<Event>,
    deadline: Instant,
}

#[derive(Debug)]
pub struct BatchAggregator {
    delay: Duration,
    queue: Option<BatchQueue>,
}

impl BatchAggregator {
    pub fn new(delay: Duration) -> Self {
        Self { delay, queue: None }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.batch_delay())
    }

    /// Append `event` and re-arm the flush timer. Returns the queue length.
    pub fn enqueue(&mut self, event: Event, now: Instant) -> usize {
        let deadline = now + self.delay;
        let queue = self.queue.get_or_insert_with(|| BatchQueue {
            events: Vec::new(),
            deadline,
        });
        queue.events.push(event);
        queue.deadline = deadline;
        debug!(queued = queue.events.len(), "Batch flush timer re-armed");
        queue.events.len()
    }

    /// Flush deadline, if anything is queued.
    pub fn deadline(&self) -> Option<Instant> {
        self.queue.as_ref().map(|q| q.deadline)
    }

    /// Drain the queue in arrival order if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<Event> {
        match self.queue.take() {
            Some(queue) if queue.deadline <= now => queue.events,
            other => {
                self.queue = other;
                Vec::new()
            }
        }
    }

    /// Cancel the flush timer, discarding queued events.
    pub fn cancel(&mut self) -> usize {
        self.queue.take().map_or(0, |q| q.events.len())
    }

    pub fn queued(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.events.len())
    }
}
