//! API module for tsuzuki-core.
//!
//! Request types handed to transports, and the diagnostic events the engine
//! reports while it works.

pub mod logging;
pub mod request;
pub mod sink;

pub use logging::{JsonlSink, LogSink};
pub use request::{GenerationRequest, PromptInputs, build_request_body};
pub use sink::{CollectingSink, DiagnosticSink, EngineEvent};
