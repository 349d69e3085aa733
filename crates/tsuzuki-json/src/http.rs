//! OpenAI-compatible HTTP transport.

use std::future::Future;
use std::io;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tsuzuki_core::api::build_request_body;
use tsuzuki_core::{CompletionTransport, GenerationRequest, TransportError, TransportResponse};

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: String, api_key: Option<String>, timeout_secs: u64) -> io::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| io::Error::other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Network(format!("request timed out: {}", e))
    } else {
        TransportError::Network(e.to_string())
    }
}

impl CompletionTransport for HttpTransport {
    fn send(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let streaming = request.streaming;
        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&build_request_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        log::debug!(target: "tsuzuki", "POST {} (stream: {})", self.endpoint, streaming);
        let cancel = cancel.clone();

        async move {
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                response = builder.send() => response.map_err(network_error)?,
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransportError::http(status.as_u16(), &body));
            }

            if streaming {
                let body = response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(network_error))
                    .boxed();
                Ok(TransportResponse::Stream {
                    status: status.as_u16(),
                    body,
                })
            } else {
                let body = response.text().await.map_err(network_error)?;
                Ok(TransportResponse::Buffered {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
