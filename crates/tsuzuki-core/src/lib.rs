//! tsuzuki-core: streaming generation with automatic continuation
//!
//! Calls a completion provider, detects output that was cut off mid-markup or
//! mid-sentence, and keeps issuing continuation requests (up to a retry
//! budget) until the content is whole, deduplicating text at each seam.
//!
//! # Quick Start
//!
//! ```no_run
//! use tsuzuki_core::{Engine, EngineConfig, GenerationOutcome, LogSink, PromptInputs};
//! # use tsuzuki_core::{CompletionTransport, GenerationRequest, TransportError, TransportResponse};
//! # use tokio_util::sync::CancellationToken;
//! # struct MyTransport;
//! # impl CompletionTransport for MyTransport {
//! #     fn send(&self, _: &GenerationRequest, _: &CancellationToken)
//! #         -> impl std::future::Future<Output = Result<TransportResponse, TransportError>> + Send {
//! #         async { Err(TransportError::Cancelled) }
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = EngineConfig::load_from_env()?;
//!     let mut engine = Engine::new(MyTransport, config, LogSink);
//!     let inputs = PromptInputs {
//!         user_prompt: "Write a short scene as HTML".to_string(),
//!         model: "gpt-4o-mini".to_string(),
//!         ..Default::default()
//!     };
//!
//!     if let GenerationOutcome::Success { content, .. } = engine.generate(inputs).await {
//!         println!("{}", content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod continuation;
pub mod engine;
pub mod error;
pub mod markup;
pub mod merge;
pub mod sanitize;
pub mod stream;
pub mod transport;
pub mod truncation;

pub use api::{
    CollectingSink, DiagnosticSink, EngineEvent, GenerationRequest, JsonlSink, LogSink,
    PromptInputs,
};
pub use config::{ConfigProvider, DetectionMode, EngineConfig, OverlapConfig};
pub use continuation::{ContinuationContext, ContinuationState};
pub use engine::{CancelHandle, Engine, EnginePhase, GenerationOutcome};
pub use error::{ErrorKind, GenerationError, TransportError};
pub use stream::GenerationResult;
pub use transport::{ByteStream, CompletionTransport, TransportResponse};
pub use truncation::TruncationReport;
