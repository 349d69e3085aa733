//! Response consumption.
//!
//! Streamed bodies arrive as arbitrary byte chunks. [`StreamConsumer`] holds
//! back incomplete UTF-8 sequences and partial lines until the rest arrives,
//! then interprets each `data:` line as a server-sent event frame.

use crate::error::{GenerationError, TransportError};
use crate::transport::ByteStream;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one transport call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub raw_text: String,
    /// Frames that carried non-empty text.
    pub chunk_count: usize,
    pub first_token_latency_ms: Option<u64>,
    pub total_latency_ms: u64,
    pub http_status: u16,
}

/// Incremental decoder for an SSE completion stream.
#[derive(Debug)]
pub struct StreamConsumer {
    started: Instant,
    /// Undecoded bytes of a multi-byte character split across chunks.
    pending: Vec<u8>,
    /// Decoded text of the current, unterminated line.
    line: String,
    text: String,
    chunk_count: usize,
    first_token_latency_ms: Option<u64>,
    done: bool,
}

impl StreamConsumer {
    /// Latencies are measured from `started`, normally the moment the request was sent.
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            pending: Vec::new(),
            line: String::new(),
            text: String::new(),
            chunk_count: 0,
            first_token_latency_ms: None,
            done: false,
        }
    }

    /// True once a `[DONE]` frame was seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed the next chunk of raw body bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.done {
            return;
        }
        self.pending.extend_from_slice(bytes);
        let decoded = self.decode_pending();
        self.push_text(&decoded);
    }

    /// Flush what is left and produce the result.
    ///
    /// A final line without a trailing newline still counts as a frame.
    pub fn finish(mut self, http_status: u16) -> Result<GenerationResult, GenerationError> {
        if !self.done {
            if !self.pending.is_empty() {
                let rest = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.line.push_str(&rest);
            }
            let line = std::mem::take(&mut self.line);
            self.process_line(&line);
        }

        if self.chunk_count == 0 || self.text.is_empty() {
            return Err(GenerationError::EmptyStream);
        }

        Ok(GenerationResult {
            raw_text: self.text,
            chunk_count: self.chunk_count,
            first_token_latency_ms: self.first_token_latency_ms,
            total_latency_ms: elapsed_ms(self.started),
            http_status,
        })
    }

    /// Decode as much of `pending` as possible. Invalid sequences become
    /// U+FFFD; an incomplete trailing sequence stays pending.
    fn decode_pending(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to guarantees this prefix decodes.
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn push_text(&mut self, decoded: &str) {
        let mut rest = decoded;
        while let Some(pos) = rest.find('\n') {
            self.line.push_str(&rest[..pos]);
            let line = std::mem::take(&mut self.line);
            self.process_line(&line);
            if self.done {
                return;
            }
            rest = &rest[pos + 1..];
        }
        self.line.push_str(rest);
    }

    fn process_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        let frame: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                log::debug!(target: "tsuzuki", "skipping malformed frame: {}", e);
                return;
            }
        };

        if let Some(delta) = frame_text(&frame)
            && !delta.is_empty()
        {
            if self.first_token_latency_ms.is_none() {
                self.first_token_latency_ms = Some(elapsed_ms(self.started));
            }
            self.chunk_count += 1;
            self.text.push_str(delta);
        }
    }
}

/// Text carried by one streamed frame.
///
/// Chat deltas first, then legacy completion frames and buffered-shape frames.
fn frame_text(frame: &Value) -> Option<&str> {
    let choice = frame.get("choices")?.get(0)?;
    choice["delta"]["content"]
        .as_str()
        .or_else(|| choice["text"].as_str())
        .or_else(|| choice["message"]["content"].as_str())
}

/// Drive `body` to completion, stopping early on `[DONE]` or cancellation.
///
/// Cancellation is checked before every read and raced against the pending
/// read, so a stalled provider cannot delay it.
pub async fn read_stream(
    mut body: ByteStream,
    cancel: &CancellationToken,
    http_status: u16,
    started: Instant,
) -> Result<GenerationResult, GenerationError> {
    let mut consumer = StreamConsumer::new(started);

    while !consumer.is_done() {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            next = body.next() => next,
        };
        match next {
            Some(Ok(bytes)) => consumer.push(&bytes),
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    consumer.finish(http_status)
}

/// Interpret a complete (non-streamed) response body.
pub fn parse_buffered(
    body: &str,
    http_status: u16,
    started: Instant,
) -> Result<GenerationResult, GenerationError> {
    let json: Value =
        serde_json::from_str(body).map_err(|_| TransportError::malformed(body))?;
    let choice = json
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| TransportError::malformed(body))?;

    let text = choice["message"]["content"]
        .as_str()
        .or_else(|| choice["text"].as_str())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(GenerationError::EmptyBuffer);
    }

    let total_latency_ms = elapsed_ms(started);
    Ok(GenerationResult {
        raw_text: text.to_string(),
        chunk_count: 1,
        first_token_latency_ms: Some(total_latency_ms),
        total_latency_ms,
        http_status,
    })
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
