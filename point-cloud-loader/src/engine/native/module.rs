use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ModuleConfig;
use crate::error::Result;

/// Byte offset into a native module's foreign heap. Zero is null.
pub type Address = u32;

/// The null foreign heap address.
pub const NULL: Address = 0;

/// Addresses handed to the native decode entry point.
///
/// All out-parameter slots are caller-allocated. The colour slots are null
/// when colour extraction was not requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeArgs {
    /// Raw LAS/LAZ bytes.
    pub input: Address,
    pub input_len: u32,
    /// u32 receiving the decoded XYZ byte size.
    pub out_size: Address,
    /// Six f32: min x, y, z then max x, y, z.
    pub bounds: Address,
    /// u32 receiving the address of the native-owned colour block.
    pub colour_ptr: Address,
    /// u32 receiving the colour block size in bytes.
    pub colour_size: Address,
    /// Three f32 scale factors.
    pub scales: Address,
    /// Three f32 offsets.
    pub offsets: Address,
    /// u32 receiving the number of decoded points.
    pub point_count: Address,
}

/// Callback receiving diagnostic text from the native side.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional sinks for native error and debug output.
#[derive(Clone, Default)]
pub struct ModuleHooks {
    pub on_error: Option<MessageHandler>,
    pub on_debug: Option<MessageHandler>,
}

impl fmt::Debug for ModuleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHooks")
            .field("on_error", &self.on_error.is_some())
            .field("on_debug", &self.on_debug.is_some())
            .finish()
    }
}

/// Capability interface of an opaque native decoder module.
///
/// Mirrors the calling contract of a compiled decoder: a foreign heap
/// addressed by integers, `malloc`/`free`, and a single decode entry point
/// that writes its results through caller-supplied out-parameters.
pub trait NativeModule: Send + Sync {
    /// Allocate `size` bytes on the foreign heap. Returns [`NULL`] on failure.
    fn malloc(&self, size: usize) -> Address;

    /// Release a region the caller allocated.
    fn free(&self, address: Address);

    /// Release a region the native side allocated and handed over.
    fn free_owned(&self, address: Address) {
        self.free(address);
    }

    /// Copy `bytes` into the foreign heap at `address`.
    fn write(&self, address: Address, bytes: &[u8]) -> Result<()>;

    /// Copy `out.len()` bytes starting at `address` into `out`.
    fn read(&self, address: Address, out: &mut [u8]) -> Result<()>;

    /// Decode the input region. Returns the address of the XYZ block, or
    /// [`NULL`] when the input could not be decoded.
    fn decode(&self, args: &DecodeArgs) -> Address;

    /// Install error/debug sinks. Modules without diagnostics ignore this.
    fn set_hooks(&self, _hooks: ModuleHooks) {}
}

/// Reasons a native module could not be brought up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleInitError {
    #[error("native module factory unavailable: {0}")]
    Unavailable(String),

    #[error("native module rejected configuration: {0}")]
    Rejected(String),

    #[error("native module aborted during instantiation: {0}")]
    Aborted(String),
}

/// Produces ready native module instances.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    async fn instantiate(
        &self,
        config: &ModuleConfig,
    ) -> std::result::Result<Arc<dyn NativeModule>, ModuleInitError>;
}
