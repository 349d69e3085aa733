use std::io::{self, Write};

use tsuzuki_core::GenerationOutcome;

/// Map `io::ErrorKind` to a stable coarse-grained error code string.
fn error_code(e: &io::Error) -> &'static str {
    match e.kind() {
        io::ErrorKind::NotFound => "not_found",
        io::ErrorKind::InvalidInput => "invalid_input",
        io::ErrorKind::PermissionDenied => "permission_denied",
        io::ErrorKind::InvalidData => "invalid_data",
        _ => "internal_error",
    }
}

/// Write the outcome to stdout as a single `result` record.
pub fn emit_result(outcome: &GenerationOutcome) -> io::Result<()> {
    let mut json = serde_json::to_value(outcome)?;
    json["type"] = serde_json::json!("result");
    println!("{}", json);
    io::stdout().flush()
}

/// Build the final `done` record.
pub fn done_record(result: &io::Result<GenerationOutcome>) -> serde_json::Value {
    match result {
        Ok(GenerationOutcome::Success { .. }) => serde_json::json!({"type": "done", "ok": true}),
        Ok(GenerationOutcome::Cancelled) => serde_json::json!({
            "type": "done",
            "ok": false,
            "code": "cancelled",
            "message": "Generation was cancelled.",
        }),
        Ok(GenerationOutcome::Failed { kind, message }) => serde_json::json!({
            "type": "done",
            "ok": false,
            "code": kind.as_ref(),
            "message": message,
        }),
        Err(e) => serde_json::json!({
            "type": "done",
            "ok": false,
            "code": error_code(e),
            "message": e.to_string(),
        }),
    }
}

/// Write the `done` record to stderr. Always the last line there.
pub fn emit_done(result: &io::Result<GenerationOutcome>) {
    eprintln!("{}", done_record(result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsuzuki_core::ErrorKind;

    #[test]
    fn test_done_for_success() {
        let outcome = GenerationOutcome::Success {
            content: "<p>x</p>".to_string(),
            retries_used: 0,
            degraded: false,
            warning: None,
        };
        let done = done_record(&Ok(outcome));
        assert_eq!(done["ok"], true);
        assert!(done.get("code").is_none());
    }

    #[test]
    fn test_done_for_failure_uses_kind_code() {
        let outcome = GenerationOutcome::Failed {
            kind: ErrorKind::EmptyStream,
            message: "The model returned an empty response.".to_string(),
        };
        let done = done_record(&Ok(outcome));
        assert_eq!(done["ok"], false);
        assert_eq!(done["code"], "empty_stream");
    }

    #[test]
    fn test_done_for_cancel_and_io_error() {
        assert_eq!(
            done_record(&Ok(GenerationOutcome::Cancelled))["code"],
            "cancelled"
        );
        let err = io::Error::new(io::ErrorKind::InvalidInput, "Invalid JSON input: eof");
        let done = done_record(&Err(err));
        assert_eq!(done["code"], "invalid_input");
        assert_eq!(done["message"], "Invalid JSON input: eof");
    }
}
