use std::io;
use std::path::PathBuf;

use tsuzuki_core::{DiagnosticSink, EngineEvent, JsonlSink, LogSink};

/// Diagnostic sink for tsuzuki-json.
///
/// Every event goes to stderr as one JSONL record, to the `log` facade, and
/// optionally to a JSONL file.
pub struct JsonDiagnosticSink {
    log: LogSink,
    file: Option<JsonlSink>,
}

impl JsonDiagnosticSink {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        Self {
            log: LogSink,
            file: log_file.map(JsonlSink::new),
        }
    }
}

impl DiagnosticSink for JsonDiagnosticSink {
    fn handle(&mut self, run_id: &str, event: &EngineEvent) -> io::Result<()> {
        let mut json = serde_json::to_value(event)?;
        json["run_id"] = serde_json::json!(run_id);
        eprintln!("{}", json);

        self.log.handle(run_id, event)?;
        if let Some(file) = &mut self.file {
            file.handle(run_id, event)?;
        }
        Ok(())
    }
}
