/// Bytes per mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default ceiling of the process-wide allocation ledger (MiB).
pub const DEFAULT_BUDGET_MB: u64 = 500;

/// Default initial size of the native module's foreign heap.
pub const DEFAULT_MEMORY_INITIAL_SIZE: u64 = 16 * MIB;

/// Default maximum size the foreign heap may grow to.
pub const DEFAULT_MEMORY_MAXIMUM_SIZE: u64 = 512 * MIB;

/// Alignment of every foreign heap allocation.
pub const HEAP_ALIGNMENT: u32 = 8;

/// Environment variable carrying the initial foreign heap size in MiB.
pub const ENV_MEMORY_INITIAL_MB: &str = "POINT_CLOUD_MEMORY_INITIAL_MB";

/// Environment variable carrying the maximum foreign heap size in MiB.
pub const ENV_MEMORY_MAXIMUM_MB: &str = "POINT_CLOUD_MEMORY_MAXIMUM_MB";

/// Environment variable toggling native module debug logging.
pub const ENV_DEBUG: &str = "POINT_CLOUD_DEBUG";
