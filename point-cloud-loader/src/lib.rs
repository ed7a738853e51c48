//! LAS/LAZ decode pipeline for point cloud display.
//!
//! Acquires file bytes from a buffer or URL, drives an opaque native decoder
//! across its foreign heap, and turns the result into normalised,
//! colour-corrected geometry. A controller sequences reloads so only the
//! newest request is ever surfaced.
//!
//! ## Pipeline
//!
//! ```text
//! DecodePipelineController
//!   → StreamIngestor          (buffer copy or chunked fetch)
//!   → NativeModuleLifecycle   (shared one-time module start-up)
//!   → NativeDecodeBridge      (malloc, decode, copy out, free)
//!   → PointCloudPostProcessor (decimate, clamp, normalise, colour)
//! ```

/// Module memory sizing, loader settings and their sources.
pub mod config;

/// Decode pipeline components.
pub mod engine;

/// Typed error taxonomy with stable codes.
pub mod error;

/// JSON-RPC 2.0 notifications for an embedding frontend.
pub mod rpc;

/// Monotonic clock and background task spawning per target.
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use config::{LoaderConfig, ModuleConfig, ModuleConfigOverrides};
pub use engine::assets::{PointCloudBounds, PointCloudGeometry, PointCloudStats};
pub use engine::loading::{
    DecodeOptions, DecodePipelineController, DecodeRequest, LoadPhase, PipelineEvent,
    StreamIngestor,
};
pub use engine::memory::MemoryBudgetGuard;
pub use engine::native::{DecodeResult, LasModuleFactory, NativeDecodeBridge, NativeModuleLifecycle};
pub use engine::processing::{PointCloudPostProcessor, PostProcessOptions};
pub use error::{PipelineError, Result};
