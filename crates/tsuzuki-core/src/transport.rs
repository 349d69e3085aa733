//! Completion transport abstraction.
//!
//! The engine never speaks HTTP itself. A transport turns a
//! [`GenerationRequest`] into either a lazy stream of raw body bytes or a single
//! buffered body, and must stop promptly once the token it was handed is
//! cancelled.

use crate::api::request::GenerationRequest;
use crate::error::TransportError;
use futures_util::stream::BoxStream;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Raw body chunks of a streamed response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// What a transport hands back for one request.
pub enum TransportResponse {
    /// Server-sent-event style body, read incrementally.
    Stream { status: u16, body: ByteStream },
    /// Complete JSON body.
    Buffered { status: u16, body: String },
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportResponse::Stream { status, .. } => {
                f.debug_struct("Stream").field("status", status).finish()
            }
            TransportResponse::Buffered { status, body } => f
                .debug_struct("Buffered")
                .field("status", status)
                .field("len", &body.len())
                .finish(),
        }
    }
}

/// Sends generation requests to a completion provider.
///
/// Implementations return `Err(TransportError::Http { .. })` for non-2xx
/// answers and `Err(TransportError::Cancelled)` when `cancel` fires before a
/// response arrives. Mid-stream aborts are handled by the engine, which stops
/// polling the body once the token is cancelled.
pub trait CompletionTransport {
    fn send(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}
