//! Logging sinks for engine events.
//!
//! `LogSink` forwards events to the `log` facade; `JsonlSink` appends them to a
//! JSONL file for later inspection. Both swallow their own failures.

use super::sink::{DiagnosticSink, EngineEvent};
use chrono::Utc;
use log::Level;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

/// Forwards events to the `log` crate under the `tsuzuki` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    fn level(event: &EngineEvent) -> Level {
        match event {
            EngineEvent::Failed { .. } => Level::Error,
            EngineEvent::RetriesExhausted { .. } => Level::Warn,
            EngineEvent::TruncationDetected { .. }
            | EngineEvent::ContinuationScheduled { .. }
            | EngineEvent::Completed { .. }
            | EngineEvent::Cancelled => Level::Info,
            EngineEvent::GenerationStarted { .. }
            | EngineEvent::StreamMetrics { .. }
            | EngineEvent::OverlapRemoved { .. } => Level::Debug,
        }
    }
}

impl DiagnosticSink for LogSink {
    fn handle(&mut self, run_id: &str, event: &EngineEvent) -> io::Result<()> {
        let level = Self::level(event);
        if log::log_enabled!(target: "tsuzuki", level) {
            let fields = serde_json::to_string(event).unwrap_or_default();
            log::log!(target: "tsuzuki", level, "[{}] {} {}", run_id, event.name(), fields);
        }
        Ok(())
    }
}

/// Appends `{"timestamp", "run_id", "event"}` lines to a file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiagnosticSink for JsonlSink {
    fn handle(&mut self, run_id: &str, event: &EngineEvent) -> io::Result<()> {
        let log_entry = json!({
            "timestamp": Utc::now().timestamp(),
            "run_id": run_id,
            "event": event,
        });

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", log_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut sink = JsonlSink::new(&path);
        sink.handle("run-1", &EngineEvent::Cancelled).unwrap();
        sink.handle("run-1", &EngineEvent::RetriesExhausted { max_retries: 2 })
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["event"]["type"], "cancelled");
        assert_eq!(lines[1]["event"]["max_retries"], 2);
    }

    #[test]
    fn test_jsonl_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new(dir.path().join("missing").join("events.jsonl"));
        assert!(sink.handle("run", &EngineEvent::Cancelled).is_err());
    }

    #[test]
    fn test_log_sink_levels() {
        assert_eq!(
            LogSink::level(&EngineEvent::RetriesExhausted { max_retries: 1 }),
            Level::Warn
        );
        assert_eq!(LogSink::level(&EngineEvent::Cancelled), Level::Info);
        let mut sink = LogSink;
        assert!(sink.handle("run", &EngineEvent::Cancelled).is_ok());
    }
}
