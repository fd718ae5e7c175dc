//! Mapping events to the coalescing stages they pass through.

use super::PipelineConfig;
use crate::events::{Coalescing, Event};

/// Decides whether an event is debounced, batched, both or neither.
///
/// An explicit [`Coalescing`] tag on the event is the only class it gets.
/// Untagged events are matched against each stage's patterns independently,
/// so a kind matching both is debounced and then batched.
#[derive(Debug, Clone, Default)]
pub struct KindClassifier {
    debounce: Vec<String>,
    batch: Vec<String>,
}

impl KindClassifier {
    pub fn new(debounce: Vec<String>, batch: Vec<String>) -> Self {
        Self { debounce, batch }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.debounce_kinds.clone(), config.batch_kinds.clone())
    }

    /// Whether the debounce gate holds this event.
    pub fn debounces(&self, event: &Event) -> bool {
        match event.coalescing {
            Some(tag) => tag == Coalescing::Debounce,
            None => matches_any(&self.debounce, &event.kind),
        }
    }

    /// Whether the batch aggregator queues this event.
    pub fn batches(&self, event: &Event) -> bool {
        match event.coalescing {
            Some(tag) => tag == Coalescing::Batch,
            None => matches_any(&self.batch, &event.kind),
        }
    }
}

fn matches_any(patterns: &[String], kind: &str) -> bool {
    patterns.iter().any(|p| kind.contains(p.as_str()))
}
