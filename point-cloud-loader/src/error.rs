//! Typed error taxonomy for the decode pipeline.
//!
//! Every stage returns [`PipelineError`]. Cancellation is reported as
//! [`PipelineError::Aborted`] so the controller can drop it without surfacing
//! a failure to the user.

/// Errors raised while acquiring, decoding or post-processing a point cloud.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    // ── Ingest ───────────────────────────────────────────────────────
    #[error("Empty or invalid buffer received")]
    EmptySource,

    #[error("Failed to fetch {url}: {status} {reason}")]
    Fetch {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Load aborted")]
    Aborted,

    // ── Native module ────────────────────────────────────────────────
    #[error("Decoder not initialised: native module is not ready")]
    NotInitialized,

    #[error("Native module initialisation failed: {0}")]
    Initialization(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Foreign heap could not allocate {size} bytes")]
    ForeignAllocation { size: usize },

    #[error("Foreign heap access out of bounds: {length} bytes at {address:#x}")]
    HeapAccess { address: u32, length: usize },

    // ── Memory ───────────────────────────────────────────────────────
    #[error(
        "Memory budget exceeded: requested {requested} bytes with {in_use} of {ceiling} in use"
    )]
    MemoryBudgetExceeded {
        requested: u64,
        in_use: u64,
        ceiling: u64,
    },
}

impl PipelineError {
    /// Cancellation is expected during reloads and teardown.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Stable integer code for structured events.
    ///
    /// - 1xx: ingest
    /// - 2xx: native module
    /// - 3xx: memory
    pub fn error_code(&self) -> u32 {
        match self {
            Self::EmptySource => 100,
            Self::Fetch { .. } => 101,
            Self::Transport(_) => 102,
            Self::Aborted => 103,
            Self::NotInitialized => 200,
            Self::Initialization(_) => 201,
            Self::Decode(_) => 202,
            Self::ForeignAllocation { .. } => 203,
            Self::HeapAccess { .. } => 204,
            Self::MemoryBudgetExceeded { .. } => 300,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
