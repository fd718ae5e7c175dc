//! Event type definitions for the interceptor pipeline.
//!
//! Events are opaque to the pipeline apart from their `kind`: the payload is
//! arbitrary JSON and `meta` only ever gains keys on the way through.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of the event synthesized by error containment.
pub const ERROR_OCCURRED: &str = "ERROR_OCCURRED";

/// Producer-assigned coalescing tag.
///
/// When an event carries one it overrides the kind-based classification
/// configured on the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coalescing {
    /// Collapse repeated events sharing a debounce key into one delayed forward.
    Debounce,
    /// Queue the event and deliver it with the rest of its batch window.
    Batch,
    /// Forward without any coalescing.
    None,
}

/// A state-mutation event travelling towards the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Namespaced identifier, e.g. `search.SET_SEARCH_TERM`. A missing kind
    /// deserializes as empty and is rejected inside the pipeline.
    #[serde(default)]
    pub kind: CompactString,
    /// Arbitrary serializable data.
    #[serde(default)]
    pub payload: Value,
    /// Pipeline annotations. Additive only.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    /// Explicit coalescing tag, if the producer assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coalescing: Option<Coalescing>,
}

impl Event {
    /// Create an event with empty meta and no explicit coalescing tag.
    pub fn new(kind: impl Into<CompactString>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            meta: Map::new(),
            coalescing: None,
        }
    }

    /// Tag the event with an explicit coalescing class.
    pub fn with_coalescing(mut self, coalescing: Coalescing) -> Self {
        self.coalescing = Some(coalescing);
        self
    }

    /// Attach a caller-supplied meta field.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Build the event error containment forwards in place of a failed one.
    pub fn error_occurred(message: impl Into<String>, original_action: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("message".to_owned(), Value::String(message.into()));
        payload.insert(
            "originalAction".to_owned(),
            Value::String(original_action.to_owned()),
        );
        Self::new(ERROR_OCCURRED, Value::Object(payload))
    }

    /// Whether this event was synthesized by error containment.
    pub fn is_error_occurred(&self) -> bool {
        self.kind == ERROR_OCCURRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal_event() {
        let event: Event = serde_json::from_str(r#"{"kind":"map.SET_ZOOM","payload":4}"#).unwrap();
        assert_eq!(event.kind, "map.SET_ZOOM");
        assert_eq!(event.payload, json!(4));
        assert!(event.meta.is_empty());
        assert_eq!(event.coalescing, None);
    }

    #[test]
    fn test_missing_kind_deserializes_empty() {
        let event: Event = serde_json::from_str(r#"{"payload":[1]}"#).unwrap();
        assert!(event.kind.is_empty());
    }

    #[test]
    fn test_deserialize_coalescing_tag() {
        let event: Event =
            serde_json::from_str(r#"{"kind":"x","payload":null,"coalescing":"batch"}"#).unwrap();
        assert_eq!(event.coalescing, Some(Coalescing::Batch));
    }

    #[test]
    fn test_error_occurred_shape() {
        let event = Event::error_occurred("boom", "user.SET_PROFILE");
        assert!(event.is_error_occurred());
        assert_eq!(
            event.payload,
            json!({ "message": "boom", "originalAction": "user.SET_PROFILE" })
        );
        assert!(event.meta.is_empty());
    }
}
