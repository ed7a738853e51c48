use serde::Serialize;

/// Controller state for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "snake_case")]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Human-readable reason of the last failure.
    Failed(String),
}

/// Stage flags and byte counts for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadingProgress {
    pub source_acquired: bool,
    pub module_ready: bool,
    pub decoded: bool,
    pub geometry_ready: bool,
    pub bytes_received: u64,
    /// Announced download size; absent for buffers and unsized responses.
    pub bytes_total: Option<u64>,
}
