//! The continuation controller.
//!
//! [`Engine::generate`] runs one top-level generation: call the transport,
//! sanitize, check for truncation, and while the output looks cut off issue
//! continuation calls and stitch their output onto what came before. Calls are
//! strictly sequential because every continuation prompt is built from the
//! merged result of the previous one.

use crate::api::request::{GenerationRequest, PromptInputs};
use crate::api::sink::{DiagnosticSink, EngineEvent};
use crate::config::ConfigProvider;
use crate::continuation::{ContinuationState, continuation_request};
use crate::error::{ErrorKind, GenerationError, TransportError};
use crate::merge;
use crate::sanitize::{sanitize, sanitize_fragment};
use crate::stream::{self, GenerationResult};
use crate::transport::{CompletionTransport, TransportResponse};
use crate::truncation;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use strum::AsRefStr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shown with content returned after the retry budget ran out.
pub const DEGRADED_WARNING: &str =
    "The response still looked incomplete after the maximum number of continuations.";

/// Final result of [`Engine::generate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Success {
        content: String,
        /// Continuation calls made after the initial one.
        retries_used: usize,
        /// The content may still be incomplete; see `warning`.
        degraded: bool,
        warning: Option<String>,
    },
    /// Aborted through [`Engine::cancel`]. Not an error.
    Cancelled,
    Failed {
        kind: ErrorKind,
        /// User-facing text; never contains provider response bodies.
        message: String,
    },
}

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnginePhase {
    #[default]
    Idle,
    /// Waiting on the initial call.
    Generating,
    /// Waiting on a continuation call.
    Continuing,
}

#[derive(Debug, Default)]
struct Shared {
    token: Option<CancellationToken>,
    phase: EnginePhase,
}

/// Cancels the engine's active generation from another task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    shared: Arc<Mutex<Shared>>,
}

impl CancelHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal the active generation to stop. Returns false when idle.
    pub fn cancel(&self) -> bool {
        match &self.lock().token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.lock().phase
    }

    fn set_phase(&self, phase: EnginePhase) {
        self.lock().phase = phase;
    }

    /// Install a fresh token, aborting any previous one.
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock().token.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn disarm(&self) {
        let mut shared = self.lock();
        shared.token = None;
        shared.phase = EnginePhase::Idle;
    }
}

/// Drives generations over a transport, one at a time.
pub struct Engine<T, C, S> {
    transport: T,
    config: C,
    sink: S,
    state: ContinuationState,
    handle: CancelHandle,
}

impl<T, C, S> Engine<T, C, S>
where
    T: CompletionTransport,
    C: ConfigProvider,
    S: DiagnosticSink,
{
    pub fn new(transport: T, config: C, sink: S) -> Self {
        Self {
            transport,
            config,
            sink,
            state: ContinuationState::default(),
            handle: CancelHandle::default(),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.handle.phase()
    }

    /// Snapshot of the current continuation cycle.
    pub fn continuation_state(&self) -> ContinuationState {
        self.state.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Cancel the active generation. No-op when idle.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Handle for cancelling from another task while `generate` runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Run one generation, continuing it as needed.
    pub async fn generate(&mut self, inputs: PromptInputs) -> GenerationOutcome {
        let run_id = Uuid::new_v4().to_string();
        self.state = ContinuationState::default();
        let cancel = self.handle.arm();

        let result = self.run(&run_id, &inputs, &cancel).await;

        self.state = ContinuationState::default();
        self.handle.disarm();

        match result {
            Ok(outcome) => {
                if let GenerationOutcome::Success {
                    content,
                    retries_used,
                    degraded,
                    ..
                } = &outcome
                {
                    self.emit(
                        &run_id,
                        EngineEvent::Completed {
                            retries_used: *retries_used,
                            content_len: content.chars().count(),
                            degraded: *degraded,
                        },
                    );
                }
                outcome
            }
            Err(e) if e.is_cancelled() => {
                self.emit(&run_id, EngineEvent::Cancelled);
                GenerationOutcome::Cancelled
            }
            Err(e) => {
                let message = e.user_message();
                let snippet = match &e {
                    GenerationError::Transport(t) => t.snippet().map(str::to_string),
                    _ => None,
                };
                self.emit(
                    &run_id,
                    EngineEvent::Failed {
                        kind: e.kind(),
                        message: message.clone(),
                        snippet,
                    },
                );
                GenerationOutcome::Failed {
                    kind: e.kind(),
                    message,
                }
            }
        }
    }

    async fn run(
        &mut self,
        run_id: &str,
        inputs: &PromptInputs,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let max_retries = self.config.max_retries();
        let mode = self.config.detection_mode();
        let overlap = self.config.overlap();
        let marker = self
            .config
            .show_continuation_indicator()
            .then(|| self.config.seam_marker().to_string());

        let base = GenerationRequest::from_inputs(inputs, self.config.streaming_enabled());
        let mut request = base.clone();
        let mut attempt = 0;

        loop {
            self.handle.set_phase(if attempt == 0 {
                EnginePhase::Generating
            } else {
                EnginePhase::Continuing
            });

            let result = self.call(run_id, attempt, &request, cancel).await?;
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }

            let candidate = if self.state.is_active {
                let fragment = sanitize_fragment(&result.raw_text);
                let merged = merge::merge(
                    &self.state.accumulated_content,
                    &fragment,
                    &overlap,
                    marker.as_deref(),
                );
                if merged.removed_chars > 0 {
                    self.emit(
                        run_id,
                        EngineEvent::OverlapRemoved {
                            removed_chars: merged.removed_chars,
                        },
                    );
                }
                merged.content
            } else {
                sanitize(&result.raw_text)
            };

            let report = truncation::detect(&candidate, mode);
            if !report.is_truncated {
                return Ok(GenerationOutcome::Success {
                    content: candidate,
                    retries_used: self.state.retry_count,
                    degraded: false,
                    warning: None,
                });
            }

            self.emit(
                run_id,
                EngineEvent::TruncationDetected {
                    attempt,
                    reason: report.reason.clone().unwrap_or_default(),
                    unclosed_tags: report.unclosed_tags().to_vec(),
                },
            );

            if self.state.is_active {
                self.state.accumulated_content = candidate;
            } else {
                self.state = ContinuationState::begin(candidate, inputs, max_retries);
            }

            if !self.state.can_retry() {
                self.emit(run_id, EngineEvent::RetriesExhausted { max_retries });
                return Ok(GenerationOutcome::Success {
                    content: self.state.accumulated_content.clone(),
                    retries_used: self.state.retry_count,
                    degraded: true,
                    warning: Some(DEGRADED_WARNING.to_string()),
                });
            }

            self.state.retry_count += 1;
            self.emit(
                run_id,
                EngineEvent::ContinuationScheduled {
                    retry: self.state.retry_count,
                    max_retries,
                    accumulated_len: self.state.accumulated_content.chars().count(),
                },
            );

            let ctx = self.state.context();
            request = continuation_request(&base, &ctx, &self.state);
            attempt += 1;
        }
    }

    /// One transport round trip, fully consumed.
    async fn call(
        &mut self,
        run_id: &str,
        attempt: usize,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        self.emit(
            run_id,
            EngineEvent::GenerationStarted {
                attempt,
                streaming: request.streaming,
                model: request.model.clone(),
            },
        );

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            response = self.transport.send(request, cancel) => response?,
        };

        let result = match response {
            TransportResponse::Stream { status, body } => {
                stream::read_stream(body, cancel, status, started).await?
            }
            TransportResponse::Buffered { status, body } => {
                stream::parse_buffered(&body, status, started)?
            }
        };

        self.emit(
            run_id,
            EngineEvent::StreamMetrics {
                attempt,
                chunk_count: result.chunk_count,
                first_token_latency_ms: result.first_token_latency_ms,
                total_latency_ms: result.total_latency_ms,
                http_status: result.http_status,
            },
        );
        Ok(result)
    }

    fn emit(&mut self, run_id: &str, event: EngineEvent) {
        // Sinks are fire-and-forget.
        let _ = self.sink.handle(run_id, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::sink::CollectingSink;
    use crate::config::EngineConfig;
    use futures_util::{StreamExt, stream};
    use std::collections::VecDeque;
    use std::future::ready;
    use std::io;
    use std::time::Duration;

    enum Reply {
        Stream(Vec<String>),
        /// Sends the chunks, then never finishes.
        Stall(Vec<String>),
        Buffered(String),
        Error(TransportError),
    }

    /// Replays scripted replies; the last one repeats once the script runs out.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn chunks(texts: &[String]) -> Vec<Result<Vec<u8>, TransportError>> {
        texts.iter().map(|t| Ok(frame(t).into_bytes())).collect()
    }

    fn to_response(reply: &Reply) -> Result<TransportResponse, TransportError> {
        match reply {
            Reply::Stream(texts) => Ok(TransportResponse::Stream {
                status: 200,
                body: stream::iter(chunks(texts)).boxed(),
            }),
            Reply::Stall(texts) => Ok(TransportResponse::Stream {
                status: 200,
                body: stream::iter(chunks(texts)).chain(stream::pending()).boxed(),
            }),
            Reply::Buffered(body) => Ok(TransportResponse::Buffered {
                status: 200,
                body: body.clone(),
            }),
            Reply::Error(e) => Err(e.clone()),
        }
    }

    impl CompletionTransport for &ScriptedTransport {
        fn send(
            &self,
            request: &GenerationRequest,
            _cancel: &CancellationToken,
        ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
            self.requests.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            let response = if replies.len() > 1 {
                let reply = replies.pop_front().unwrap();
                to_response(&reply)
            } else {
                to_response(replies.front().unwrap())
            };
            ready(response)
        }
    }

    fn frame(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    fn inputs() -> PromptInputs {
        PromptInputs {
            system_prompt: "You write HTML scenes.".to_string(),
            user_prompt: "Describe the harbour at dawn".to_string(),
            model: "story-model".to_string(),
            ..Default::default()
        }
    }

    fn config(max_retries: usize) -> EngineConfig {
        EngineConfig {
            max_retries,
            ..Default::default()
        }
    }

    fn engine(
        transport: &ScriptedTransport,
        config: EngineConfig,
    ) -> Engine<&ScriptedTransport, EngineConfig, CollectingSink> {
        Engine::new(transport, config, CollectingSink::new())
    }

    #[tokio::test]
    async fn test_complete_output_needs_no_continuation() {
        let transport = ScriptedTransport::new(vec![Reply::Stream(vec![
            "```html\n<div><p>The harbour".to_string(),
            " woke slowly.</p></div>\n```".to_string(),
        ])]);
        let mut engine = engine(&transport, config(3));

        let outcome = engine.generate(inputs()).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Success {
                content: "<div><p>The harbour woke slowly.</p></div>".to_string(),
                retries_used: 0,
                degraded: false,
                warning: None,
            }
        );
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(
            engine.sink().names(),
            vec!["generation_started", "stream_metrics", "completed"]
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_always_truncated_stops_at_retry_budget() {
        let transport = ScriptedTransport::new(vec![Reply::Stream(vec![
            "<div><p>Still going and going".to_string(),
        ])]);
        let mut engine = engine(&transport, config(2));

        let outcome = engine.generate(inputs()).await;
        match outcome {
            GenerationOutcome::Success {
                retries_used,
                degraded,
                warning,
                content,
            } => {
                assert_eq!(retries_used, 2);
                assert!(degraded);
                assert_eq!(warning.as_deref(), Some(DEGRADED_WARNING));
                assert!(content.starts_with("<div><p>Still going"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // initial call plus exactly two continuations
        assert_eq!(transport.requests().len(), 3);
        assert!(engine.sink().names().contains(&"retries_exhausted"));
        assert!(!engine.continuation_state().is_active);
    }

    #[tokio::test]
    async fn test_continuation_is_merged_without_duplication() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>The ship docked at dawn and the crew be".to_string()]),
            Reply::Stream(vec!["the crew began unloading crates.</p></div>".to_string()]),
        ]);
        let mut engine = engine(&transport, config(3));

        let outcome = engine.generate(inputs()).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Success {
                content: "<div><p>The ship docked at dawn and the crew began unloading crates.</p></div>"
                    .to_string(),
                retries_used: 1,
                degraded: false,
                warning: None,
            }
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].model, "story-model");
        assert!(requests[1].system_prompt.contains("</p></div>"));
        assert!(requests[1].user_prompt.contains("Describe the harbour at dawn"));
        assert!(engine.sink().names().contains(&"overlap_removed"));
    }

    #[tokio::test]
    async fn test_seam_marker_inserted_when_enabled() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>Rain fell on the".to_string()]),
            Reply::Stream(vec![" quiet roofs.</p></div>".to_string()]),
        ]);
        let config = EngineConfig {
            show_continuation_indicator: true,
            seam_marker: "<hr class=\"seam\">".to_string(),
            ..Default::default()
        };
        let mut engine = engine(&transport, config);

        match engine.generate(inputs()).await {
            GenerationOutcome::Success { content, .. } => assert_eq!(
                content,
                "<div><p>Rain fell on the<hr class=\"seam\"> quiet roofs.</p></div>"
            ),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    struct FailingSink;

    impl DiagnosticSink for FailingSink {
        fn handle(&mut self, _run_id: &str, _event: &EngineEvent) -> io::Result<()> {
            Err(io::Error::other("sink unavailable"))
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_fail_generation() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>The tide turned and".to_string()]),
            Reply::Stream(vec![" the boats drifted home.</p></div>".to_string()]),
        ]);
        let mut engine = Engine::new(&transport, config(3), FailingSink);

        assert_eq!(
            engine.generate(inputs()).await,
            GenerationOutcome::Success {
                content: "<div><p>The tide turned and the boats drifted home.</p></div>".to_string(),
                retries_used: 1,
                degraded: false,
                warning: None,
            }
        );
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_commits_nothing() {
        let transport = ScriptedTransport::new(vec![Reply::Stall(vec![
            "<div><p>The first chunk".to_string(),
        ])]);
        let mut engine = engine(&transport, config(3));
        let handle = engine.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let outcome = engine.generate(inputs()).await;
        assert_eq!(outcome, GenerationOutcome::Cancelled);
        assert!(!engine.continuation_state().is_active);
        let names = engine.sink().names();
        assert_eq!(names.last(), Some(&"cancelled"));
        assert!(!names.contains(&"failed"));
        assert!(!names.contains(&"completed"));
    }

    #[tokio::test]
    async fn test_cancel_during_continuation_resets_state() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>The lanterns flickered as".to_string()]),
            Reply::Stall(vec![" the wind".to_string()]),
        ]);
        let mut engine = engine(&transport, config(3));
        let handle = engine.cancel_handle();
        let watcher = tokio::spawn(async move {
            while handle.phase() != EnginePhase::Continuing {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            handle.cancel()
        });

        let outcome = engine.generate(inputs()).await;
        assert_eq!(outcome, GenerationOutcome::Cancelled);
        assert!(watcher.await.unwrap());
        assert_eq!(engine.continuation_state(), ContinuationState::default());
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let transport = ScriptedTransport::new(vec![Reply::Stream(vec![
            "<p>Short and done.</p>".to_string(),
        ])]);
        let mut engine = engine(&transport, config(3));
        engine.cancel();
        assert!(!engine.cancel_handle().cancel());

        let outcome = engine.generate(inputs()).await;
        assert!(matches!(outcome, GenerationOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_empty_stream_fails() {
        let transport = ScriptedTransport::new(vec![Reply::Stream(vec![String::new()])]);
        let mut engine = engine(&transport, config(3));

        match engine.generate(inputs()).await {
            GenerationOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::EmptyStream),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_http_error_fails_without_leaking_body() {
        let transport = ScriptedTransport::new(vec![Reply::Error(TransportError::http(
            503,
            "upstream overloaded: internal trace id 42",
        ))]);
        let mut engine = engine(&transport, config(3));

        match engine.generate(inputs()).await {
            GenerationOutcome::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::Transport);
                assert!(message.contains("503"));
                assert!(!message.contains("overloaded"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        match engine.sink().events.last() {
            Some(EngineEvent::Failed { snippet, .. }) => {
                assert!(snippet.as_deref().unwrap().contains("overloaded"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_during_continuation_resets_state() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>Half a though".to_string()]),
            Reply::Error(TransportError::Network("connection reset".to_string())),
        ]);
        let mut engine = engine(&transport, config(3));

        let outcome = engine.generate(inputs()).await;
        assert!(matches!(
            outcome,
            GenerationOutcome::Failed {
                kind: ErrorKind::Transport,
                ..
            }
        ));
        assert!(!engine.continuation_state().is_active);
    }

    #[tokio::test]
    async fn test_buffered_mode() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "<div><p>Calm seas.</p></div>"}}]
        })
        .to_string();
        let transport = ScriptedTransport::new(vec![Reply::Buffered(body)]);
        let config = EngineConfig {
            streaming_enabled: false,
            ..Default::default()
        };
        let mut engine = engine(&transport, config);

        match engine.generate(inputs()).await {
            GenerationOutcome::Success { content, .. } => {
                assert_eq!(content, "<div><p>Calm seas.</p></div>")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!transport.requests()[0].streaming);
    }

    #[tokio::test]
    async fn test_empty_buffer_fails() {
        let body = r#"{"choices":[{"message":{"content":""}}]}"#.to_string();
        let transport = ScriptedTransport::new(vec![Reply::Buffered(body)]);
        let config = EngineConfig {
            streaming_enabled: false,
            ..Default::default()
        };
        let mut engine = engine(&transport, config);

        assert!(matches!(
            engine.generate(inputs()).await,
            GenerationOutcome::Failed {
                kind: ErrorKind::EmptyBuffer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_each_generation_starts_clean() {
        let transport = ScriptedTransport::new(vec![
            Reply::Stream(vec!["<div><p>First run never ends".to_string()]),
            Reply::Stream(vec!["<div><p>First run never ends".to_string()]),
            Reply::Stream(vec!["<p>Second run is tidy.</p>".to_string()]),
        ]);
        let mut engine = engine(&transport, config(1));

        let first = engine.generate(inputs()).await;
        assert!(matches!(
            first,
            GenerationOutcome::Success { degraded: true, .. }
        ));

        let second = engine.generate(inputs()).await;
        assert_eq!(
            second,
            GenerationOutcome::Success {
                content: "<p>Second run is tidy.</p>".to_string(),
                retries_used: 0,
                degraded: false,
                warning: None,
            }
        );
    }
}
