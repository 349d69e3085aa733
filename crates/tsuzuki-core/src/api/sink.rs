//! Diagnostic sink abstraction.
//!
//! The engine reports what it is doing as typed [`EngineEvent`]s and never
//! reads or writes any presentation state itself. Sinks decide whether events
//! end up in a log, a file, or a test buffer.

use crate::error::ErrorKind;
use serde::Serialize;
use std::io;
use strum::IntoStaticStr;

/// Events emitted while a generation runs.
#[derive(Debug, Clone, PartialEq, Serialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngineEvent {
    /// A transport call is about to be made. `attempt` 0 is the initial call.
    GenerationStarted {
        attempt: usize,
        streaming: bool,
        model: String,
    },

    /// Metrics for a finished transport call.
    StreamMetrics {
        attempt: usize,
        chunk_count: usize,
        first_token_latency_ms: Option<u64>,
        total_latency_ms: u64,
        http_status: u16,
    },

    /// The detector flagged the latest output as incomplete.
    TruncationDetected {
        attempt: usize,
        reason: String,
        unclosed_tags: Vec<String>,
    },

    /// A continuation request is being issued.
    ContinuationScheduled {
        retry: usize,
        max_retries: usize,
        accumulated_len: usize,
    },

    /// Duplicated text was trimmed at a seam.
    OverlapRemoved { removed_chars: usize },

    /// The retry budget ran out; the accumulated content is returned as is.
    RetriesExhausted { max_retries: usize },

    Completed {
        retries_used: usize,
        content_len: usize,
        degraded: bool,
    },

    Cancelled,

    Failed {
        kind: ErrorKind,
        message: String,
        /// Raw provider body excerpt, diagnostics only.
        snippet: Option<String>,
    },
}

impl EngineEvent {
    /// Short stable name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Receives engine events.
///
/// Delivery is fire-and-forget: the engine discards any error a sink returns,
/// so a broken sink can never fail a generation.
///
/// # Example
///
/// ```
/// use tsuzuki_core::api::sink::{DiagnosticSink, EngineEvent};
/// use std::io;
///
/// struct CountingSink {
///     count: usize,
/// }
///
/// impl DiagnosticSink for CountingSink {
///     fn handle(&mut self, _run_id: &str, _event: &EngineEvent) -> io::Result<()> {
///         self.count += 1;
///         Ok(())
///     }
/// }
///
/// let mut sink = CountingSink { count: 0 };
/// sink.handle("run", &EngineEvent::Cancelled).unwrap();
/// assert_eq!(sink.count, 1);
/// ```
pub trait DiagnosticSink: Send {
    /// Handle one event belonging to generation `run_id`.
    fn handle(&mut self, run_id: &str, event: &EngineEvent) -> io::Result<()>;
}

/// A sink that keeps every event in memory.
///
/// Useful for testing or when a caller wants to inspect a run afterwards.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<EngineEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collected events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(EngineEvent::name).collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn handle(&mut self, _run_id: &str, event: &EngineEvent) -> io::Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.handle("r", &EngineEvent::Cancelled).unwrap();
        sink.handle("r", &EngineEvent::OverlapRemoved { removed_chars: 3 })
            .unwrap();
        assert_eq!(sink.names(), vec!["cancelled", "overlap_removed"]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EngineEvent::Failed {
            kind: ErrorKind::EmptyStream,
            message: "empty".to_string(),
            snippet: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["kind"], "empty_stream");
        assert_eq!(json["type"], event.name());
    }
}
