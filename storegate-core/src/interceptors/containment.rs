//! Error containment.
//!
//! Turns every [`PipelineError`] into an `ERROR_OCCURRED` event carrying
//! only the message and the failed kind. In development mode a
//! [`DiagnosticRecord`] with the payload and a backtrace is emitted as well.

use crate::cache::ExpiringCache;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::Event;
use compact_str::CompactString;
use serde::Serialize;
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, warn};

/// Detail about a contained failure, only produced in development mode.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRecord {
    pub kind: CompactString,
    pub payload: Value,
    pub message: String,
    pub backtrace: String,
    /// Failures seen for this kind while its counter was cached, this one included.
    pub occurrences: u32,
    pub occurred_at: OffsetDateTime,
}

/// Receives diagnostic records in development mode.
pub trait DevLogger: Send + 'static {
    fn emit(&mut self, record: DiagnosticRecord);
}

impl<F> DevLogger for F
where
    F: FnMut(DiagnosticRecord) + Send + 'static,
{
    fn emit(&mut self, record: DiagnosticRecord) {
        self(record)
    }
}

/// What containment needs to remember about an event before it is moved
/// into the interceptors.
#[derive(Debug)]
pub struct FailureContext {
    kind: CompactString,
    /// Only captured when diagnostics are enabled.
    payload: Option<Value>,
}

pub struct ErrorContainment {
    development: bool,
    logger: Option<Box<dyn DevLogger>>,
    /// kind -> failure count
    failures: ExpiringCache<u32>,
}

impl ErrorContainment {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            development: config.is_development(),
            logger: None,
            failures: ExpiringCache::new(config.cache_capacity),
        }
    }

    pub fn set_logger(&mut self, logger: Box<dyn DevLogger>) {
        self.logger = Some(logger);
    }

    /// Snapshot `event` so it can be reported if it fails later.
    pub fn capture(&self, event: &Event) -> FailureContext {
        FailureContext {
            kind: event.kind.clone(),
            payload: self.development.then(|| event.payload.clone()),
        }
    }

    /// Record a failure and build the event to forward in its place.
    ///
    /// Returns `None` when the failed event was itself an `ERROR_OCCURRED`,
    /// so a store that rejects everything cannot loop.
    pub fn contain(&mut self, context: FailureContext, err: PipelineError) -> Option<Event> {
        let message = err.to_string();
        let kind = context.kind;

        let occurrences = match self.failures.get_mut(&kind) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.failures.set(kind.as_str(), 1);
                1
            }
        };

        if self.development {
            let record = DiagnosticRecord {
                kind: kind.clone(),
                payload: context.payload.unwrap_or(Value::Null),
                message: message.clone(),
                backtrace: failure_backtrace(&err),
                occurrences,
                occurred_at: OffsetDateTime::now_utc(),
            };
            match self.logger.as_mut() {
                Some(logger) => logger.emit(record),
                None => error!(
                    kind = %record.kind,
                    payload = %record.payload,
                    error = %record.message,
                    occurrences,
                    backtrace = %record.backtrace,
                    "Event failed in pipeline"
                ),
            }
        }

        if kind == crate::events::ERROR_OCCURRED {
            error!(error = %message, "ERROR_OCCURRED event failed, not re-synthesizing");
            return None;
        }

        warn!(%kind, error = %message, "Contained pipeline failure");
        Some(Event::error_occurred(message, &kind))
    }

    /// Failures recorded for `kind` while its counter is cached.
    pub fn failures(&self, kind: &str) -> u32 {
        self.failures.get(kind).copied().unwrap_or(0)
    }

    pub fn sweep(&mut self, max_age: Duration) -> usize {
        self.failures.sweep(max_age)
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }
}

/// Backtrace of the failure itself when the store error captured one,
/// otherwise of the containment site.
fn failure_backtrace(err: &PipelineError) -> String {
    match err {
        PipelineError::Store(source) if source.backtrace().status() == BacktraceStatus::Captured => {
            source.backtrace().to_string()
        }
        _ => Backtrace::force_capture().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn containment(mode: Mode) -> ErrorContainment {
        ErrorContainment::from_config(&PipelineConfig {
            mode,
            ..Default::default()
        })
    }

    #[test]
    fn test_contain_builds_error_event() {
        let mut containment = containment(Mode::Production);
        let event = Event::new("user.SET_PROFILE", json!({ "id": 7 }));
        let context = containment.capture(&event);
        assert!(context.payload.is_none());

        let synthesized = containment
            .contain(context, PipelineError::Store(anyhow::anyhow!("store offline")))
            .unwrap();
        assert_eq!(
            synthesized,
            Event::error_occurred("store offline", "user.SET_PROFILE")
        );
        assert_eq!(containment.failures("user.SET_PROFILE"), 1);
    }

    #[test]
    fn test_error_event_failure_is_not_resynthesized() {
        let mut containment = containment(Mode::Production);
        let event = Event::error_occurred("first", "x");
        let context = containment.capture(&event);
        assert!(
            containment
                .contain(context, PipelineError::Store(anyhow::anyhow!("again")))
                .is_none()
        );
    }

    #[test]
    fn test_development_mode_emits_record() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let mut containment = containment(Mode::Development);
        containment.set_logger(Box::new(move |record: DiagnosticRecord| {
            sink.lock().unwrap().push(record);
        }));

        for _ in 0..2 {
            let event = Event::new("map.SET_CENTER", json!([1, 2]));
            let context = containment.capture(&event);
            containment.contain(context, PipelineError::MissingKind);
        }

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "map.SET_CENTER");
        assert_eq!(records[0].payload, json!([1, 2]));
        assert_eq!(records[0].message, "event is missing a kind");
        assert!(!records[0].backtrace.is_empty());
        assert_eq!(records[0].occurrences, 1);
        assert_eq!(records[1].occurrences, 2);
    }

    #[test]
    fn test_store_backtrace_preferred_when_captured() {
        let source = anyhow::anyhow!("store offline");
        let captured = (source.backtrace().status() == BacktraceStatus::Captured)
            .then(|| source.backtrace().to_string());

        let backtrace = failure_backtrace(&PipelineError::Store(source));
        match captured {
            Some(captured) => assert_eq!(backtrace, captured),
            None => assert!(!backtrace.is_empty()),
        }
    }

    #[test]
    fn test_production_mode_suppresses_record() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let mut containment = containment(Mode::Production);
        containment.set_logger(Box::new(move |record: DiagnosticRecord| {
            sink.lock().unwrap().push(record);
        }));

        let event = Event::new("k", Value::Null);
        let context = containment.capture(&event);
        containment.contain(context, PipelineError::MissingKind);
        assert!(records.lock().unwrap().is_empty());
    }
}
