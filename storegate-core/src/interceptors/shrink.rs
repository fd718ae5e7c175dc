//! Payload shrinker.
//!
//! Bounds the size of payloads before they are queued or applied:
//! - long arrays keep only their trailing elements
//! - large objects keep only an allow-list of fields
//!
//! Both reductions are lossy and tagged in `meta`. Everything else passes
//! through untouched.

use crate::cache::ExpiringCache;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::Event;
use serde_json::{Map, Value};
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Alteration applied to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    Unchanged,
    Truncated { original_length: usize },
    Optimized { original_size: usize },
}

/// Counts serialized bytes without buffering them.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serialized size of `value` in bytes.
pub fn serialized_size(value: &Value) -> Result<usize, serde_json::Error> {
    let mut counter = ByteCounter::default();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

/// Add a meta key unless the producer already set it. Meta is additive only.
fn annotate(event: &mut Event, key: &str, value: Value) {
    event.meta.entry(key).or_insert(value);
}

pub struct PayloadShrinker {
    array_threshold: usize,
    array_keep_last: usize,
    object_threshold: usize,
    allow_list: Vec<String>,
    /// kind -> last alteration. A kind is warned about once while cached.
    notices: ExpiringCache<ShrinkOutcome>,
}

impl PayloadShrinker {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            array_threshold: config.array_truncate_threshold,
            array_keep_last: config.array_keep_last,
            object_threshold: config.object_size_threshold_bytes,
            allow_list: config.object_allow_list_fields.clone(),
            notices: ExpiringCache::new(config.cache_capacity),
        }
    }

    /// Reduce the event's payload if it is oversized.
    pub fn shrink(&mut self, mut event: Event) -> Result<(Event, ShrinkOutcome), PipelineError> {
        let array_len = event.payload.as_array().map(Vec::len);
        let outcome = match array_len {
            Some(len) if len > self.array_threshold => self.truncate(&mut event),
            Some(_) => ShrinkOutcome::Unchanged,
            None if event.payload.is_object() => {
                let original_size = serialized_size(&event.payload)?;
                if original_size > self.object_threshold {
                    self.strip(&mut event, original_size)
                } else {
                    ShrinkOutcome::Unchanged
                }
            }
            None => ShrinkOutcome::Unchanged,
        };

        if outcome != ShrinkOutcome::Unchanged {
            self.note(&event, outcome);
        }
        Ok((event, outcome))
    }

    fn truncate(&self, event: &mut Event) -> ShrinkOutcome {
        let Value::Array(items) = &mut event.payload else {
            return ShrinkOutcome::Unchanged;
        };
        let original_length = items.len();
        items.drain(..original_length.saturating_sub(self.array_keep_last));
        annotate(event, "truncated", Value::Bool(true));
        annotate(event, "originalLength", Value::from(original_length));
        ShrinkOutcome::Truncated { original_length }
    }

    fn strip(&self, event: &mut Event, original_size: usize) -> ShrinkOutcome {
        let Value::Object(fields) = &mut event.payload else {
            return ShrinkOutcome::Unchanged;
        };
        let kept: Map<String, Value> = self
            .allow_list
            .iter()
            .filter_map(|name| fields.remove(name).map(|v| (name.clone(), v)))
            .collect();
        event.payload = Value::Object(kept);
        annotate(event, "optimized", Value::Bool(true));
        annotate(event, "originalSize", Value::from(original_size));
        ShrinkOutcome::Optimized { original_size }
    }

    fn note(&mut self, event: &Event, outcome: ShrinkOutcome) {
        let kind = event.kind.as_str();
        if self.notices.get(kind).is_none() {
            warn!(kind, ?outcome, "Shrunk oversized payload");
        } else {
            debug!(kind, ?outcome, "Shrunk oversized payload");
        }
        self.notices.set(kind, outcome);
    }

    /// Last alteration recorded for `kind`, if still cached.
    pub fn notice(&self, kind: &str) -> Option<ShrinkOutcome> {
        self.notices.get(kind).copied()
    }

    pub fn sweep(&mut self, max_age: Duration) -> usize {
        self.notices.sweep(max_age)
    }

    pub fn clear(&mut self) {
        self.notices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shrinker() -> PayloadShrinker {
        PayloadShrinker::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_long_array_keeps_last_elements() {
        let items: Vec<Value> = (0..1500).map(Value::from).collect();
        let (event, outcome) = shrinker()
            .shrink(Event::new("readings.SET", Value::Array(items.clone())))
            .unwrap();

        assert_eq!(outcome, ShrinkOutcome::Truncated { original_length: 1500 });
        assert_eq!(event.payload, Value::Array(items[1000..].to_vec()));
        assert_eq!(event.meta["truncated"], json!(true));
        assert_eq!(event.meta["originalLength"], json!(1500));
    }

    #[test]
    fn test_array_at_threshold_is_untouched() {
        let items: Vec<Value> = (0..1000).map(Value::from).collect();
        let (event, outcome) = shrinker()
            .shrink(Event::new("readings.SET", Value::Array(items)))
            .unwrap();
        assert_eq!(outcome, ShrinkOutcome::Unchanged);
        assert_eq!(event.payload.as_array().map(Vec::len), Some(1000));
        assert!(event.meta.is_empty());
    }

    #[test]
    fn test_large_object_keeps_allow_list() {
        let payload = json!({
            "id": "x",
            "name": "y",
            "secret": "z",
            "blob": "a".repeat(100_001),
        });
        let original_size = serialized_size(&payload).unwrap();
        let (event, outcome) = shrinker()
            .shrink(Event::new("site.SET_DETAILS", payload))
            .unwrap();

        assert_eq!(outcome, ShrinkOutcome::Optimized { original_size });
        assert_eq!(event.payload, json!({ "id": "x", "name": "y" }));
        assert_eq!(event.meta["optimized"], json!(true));
        assert_eq!(event.meta["originalSize"], json!(original_size));
    }

    #[test]
    fn test_small_values_pass_through() {
        let mut shrinker = shrinker();
        for payload in [json!(null), json!(42), json!("text"), json!({ "id": 1 }), json!([1, 2])] {
            let (event, outcome) = shrinker.shrink(Event::new("k", payload.clone())).unwrap();
            assert_eq!(outcome, ShrinkOutcome::Unchanged);
            assert_eq!(event.payload, payload);
        }
    }

    #[test]
    fn test_meta_is_additive() {
        let items: Vec<Value> = (0..1001).map(Value::from).collect();
        let event = Event::new("k", Value::Array(items)).with_meta("source", json!("map"));
        let (event, _) = shrinker().shrink(event).unwrap();
        assert_eq!(event.meta["source"], json!("map"));
        assert_eq!(event.meta["truncated"], json!(true));
    }

    #[test]
    fn test_meta_keeps_producer_values() {
        let items: Vec<Value> = (0..1001).map(Value::from).collect();
        let event = Event::new("k", Value::Array(items)).with_meta("truncated", json!("upstream"));
        let (event, outcome) = shrinker().shrink(event).unwrap();

        assert_eq!(outcome, ShrinkOutcome::Truncated { original_length: 1001 });
        assert_eq!(event.meta["truncated"], json!("upstream"));
        assert_eq!(event.meta["originalLength"], json!(1001));
    }

    #[test]
    fn test_notice_recorded_per_kind() {
        let mut shrinker = shrinker();
        let items: Vec<Value> = (0..2000).map(Value::from).collect();
        shrinker.shrink(Event::new("big", Value::Array(items))).unwrap();

        assert_eq!(
            shrinker.notice("big"),
            Some(ShrinkOutcome::Truncated { original_length: 2000 })
        );
        assert_eq!(shrinker.notice("other"), None);
        shrinker.clear();
        assert_eq!(shrinker.notice("big"), None);
    }

    #[test]
    fn test_serialized_size_matches_to_vec() {
        let value = json!({ "a": [1, 2, 3], "b": "ü" });
        assert_eq!(
            serialized_size(&value).unwrap(),
            serde_json::to_vec(&value).unwrap().len()
        );
    }
}
