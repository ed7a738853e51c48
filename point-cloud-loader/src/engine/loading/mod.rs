//! Load pipeline from request to display geometry.
//!
//! Byte acquisition, HTTP transport and the controller that sequences
//! reloads and discards stale results.

/// Reload sequencing, cancellation and event delivery.
pub mod controller;

/// Buffer copy or chunked HTTP fetch into one contiguous buffer.
pub mod ingest;

/// Load phase and per-stage progress flags.
pub mod progress;

/// Immutable load requests and decode options.
pub mod request;

/// HTTP transport abstraction and the `reqwest` implementation.
pub mod transport;

pub use controller::{DecodePipelineController, PipelineEvent};
pub use ingest::StreamIngestor;
pub use progress::{LoadPhase, LoadingProgress};
pub use request::{DecodeOptions, DecodeRequest, DecodeSource};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::ReqwestTransport;
pub use transport::{HttpResponse, HttpTransport};
