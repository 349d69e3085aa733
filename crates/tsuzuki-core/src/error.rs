//! Error taxonomy for generation runs.
//!
//! Only transport failures and empty output are hard failures. Cancellation is
//! carried through `TransportError::Cancelled` so transports can report an
//! aborted request, but the engine never surfaces it as a failure.

use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;

/// Maximum characters of a raw response body kept for diagnostics.
pub const SNIPPET_LIMIT: usize = 200;

/// Failures reported by a [`CompletionTransport`](crate::transport::CompletionTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Provider answered with a non-success status.
    #[error("provider returned HTTP {status}")]
    Http { status: u16, snippet: String },

    /// Connection, timeout or read failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response envelope could not be interpreted.
    #[error("malformed response envelope")]
    Malformed { snippet: String },

    /// The request was aborted through its cancellation token.
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Build an HTTP error, keeping only a bounded prefix of the body.
    pub fn http(status: u16, body: &str) -> Self {
        TransportError::Http {
            status,
            snippet: snippet(body),
        }
    }

    /// Build a malformed-envelope error from the offending body.
    pub fn malformed(body: &str) -> Self {
        TransportError::Malformed {
            snippet: snippet(body),
        }
    }

    /// Raw body excerpt for diagnostics, if one was captured.
    pub fn snippet(&self) -> Option<&str> {
        match self {
            TransportError::Http { snippet, .. } | TransportError::Malformed { snippet } => {
                Some(snippet)
            }
            TransportError::Network(_) | TransportError::Cancelled => None,
        }
    }
}

/// Hard failures of a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// A streamed response produced no usable text.
    #[error("stream ended without any content")]
    EmptyStream,

    /// A buffered response produced no usable text.
    #[error("response body contained no content")]
    EmptyBuffer,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Transport(TransportError::Cancelled))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::EmptyStream => ErrorKind::EmptyStream,
            GenerationError::EmptyBuffer => ErrorKind::EmptyBuffer,
            GenerationError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Message suitable for showing to a user. Never contains raw provider bodies.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::EmptyStream | GenerationError::EmptyBuffer => {
                "The model returned an empty response.".to_string()
            }
            GenerationError::Transport(TransportError::Http { status, .. }) => {
                format!("The provider rejected the request (HTTP {}).", status)
            }
            GenerationError::Transport(TransportError::Network(_)) => {
                "Could not reach the provider.".to_string()
            }
            GenerationError::Transport(TransportError::Malformed { .. }) => {
                "The provider sent a response that could not be read.".to_string()
            }
            GenerationError::Transport(TransportError::Cancelled) => {
                "Generation was cancelled.".to_string()
            }
        }
    }
}

/// Stable coarse-grained failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    EmptyStream,
    EmptyBuffer,
    Transport,
}

/// Truncate a body to [`SNIPPET_LIMIT`] characters on a char boundary.
pub fn snippet(body: &str) -> String {
    match body.char_indices().nth(SNIPPET_LIMIT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
