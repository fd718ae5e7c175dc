//! Debounce gate.
//!
//! Collapses rapid repeats of a debounce key into one delayed forward. The
//! gate only holds events and reports deadlines; the pipeline task sleeps
//! until [`DebounceGate::next_deadline`] and then drains
//! [`DebounceGate::take_due`].

use crate::config::{DebounceKey, DebounceMode, PipelineConfig};
use crate::error::PipelineError;
use crate::events::Event;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// What happened to an event handed to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// First event for its key; a timer is now pending.
    Held,
    /// A timer was already pending and the new event was discarded.
    Discarded,
    /// A timer was already pending; the held event was replaced and the
    /// timer re-armed.
    Replaced,
}

#[derive(Debug)]
struct PendingDebounce {
    deadline: Instant,
    /// Arrival order, used to fire equal deadlines deterministically.
    seq: u64,
    event: Event,
}

/// Holds at most one pending event per debounce key.
#[derive(Debug)]
pub struct DebounceGate {
    delay: Duration,
    mode: DebounceMode,
    key: DebounceKey,
    pending: HashMap<String, PendingDebounce>,
    next_seq: u64,
}

impl DebounceGate {
    pub fn new(delay: Duration, mode: DebounceMode, key: DebounceKey) -> Self {
        Self {
            delay,
            mode,
            key,
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.debounce_delay(), config.debounce_mode, config.debounce_key)
    }

    /// Derive the key two events must share to be coalesced.
    ///
    /// `serde_json` keeps object keys sorted, so equal payloads always
    /// serialize to the same string regardless of construction order.
    pub fn debounce_key(&self, event: &Event) -> Result<String, PipelineError> {
        match self.key {
            DebounceKey::Kind => Ok(event.kind.to_string()),
            DebounceKey::KindAndPayload => {
                let payload = serde_json::to_string(&event.payload)?;
                Ok(format!("{}:{}", event.kind, payload))
            }
        }
    }

    /// Hold `event` until its window elapses.
    pub fn hold(&mut self, event: Event, now: Instant) -> Result<DebounceOutcome, PipelineError> {
        let key = self.debounce_key(&event)?;

        let Some(pending) = self.pending.get_mut(&key) else {
            debug!(%key, delay_ms = self.delay.as_millis() as u64, "Arming debounce timer");
            let seq = self.next_seq;
            self.next_seq += 1;
            self.pending.insert(
                key,
                PendingDebounce {
                    deadline: now + self.delay,
                    seq,
                    event,
                },
            );
            return Ok(DebounceOutcome::Held);
        };

        match self.mode {
            DebounceMode::FirstWins => {
                debug!(%key, "Debounce timer pending, discarding repeat");
                Ok(DebounceOutcome::Discarded)
            }
            DebounceMode::LatestWins => {
                debug!(%key, "Debounce timer pending, replacing held event");
                pending.deadline = now + self.delay;
                pending.event = event;
                Ok(DebounceOutcome::Replaced)
            }
        }
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every held event whose deadline is at or before
    /// `now`, in deadline order.
    pub fn take_due(&mut self, now: Instant) -> Vec<Event> {
        let due_keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let mut due: Vec<PendingDebounce> = due_keys
            .iter()
            .filter_map(|k| self.pending.remove(k))
            .collect();
        due.sort_by_key(|p| (p.deadline, p.seq));
        due.into_iter().map(|p| p.event).collect()
    }

    /// Cancel every pending timer, discarding the held events.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
