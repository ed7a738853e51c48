//! Native decoder boundary.
//!
//! The decoder is consumed as an opaque module with its own heap. The host
//! copies input in, calls a single decode entry point and copies the results
//! back out, releasing every heap region on the way out.

/// Decode marshaling across the foreign heap.
///
/// Allocates input and out-parameter slots, invokes decode and copies results into host memory.
pub mod bridge;

/// Growable linear memory with a first-fit allocator.
pub mod heap;

/// `las`-backed decoder module and its factory.
///
/// Parses LAS/LAZ input from its own heap and writes results through out-parameters.
pub mod las_module;

/// Process-wide module initialisation with shared in-flight setup.
pub mod lifecycle;

/// Capability traits and calling contract of a native decoder module.
pub mod module;

/// Scoped ownership of foreign heap blocks.
pub mod region;

pub use bridge::{DecodeResult, NativeDecodeBridge};
pub use las_module::{LasModule, LasModuleFactory};
pub use lifecycle::{NativeModuleHandle, NativeModuleLifecycle};
pub use module::{ModuleFactory, ModuleInitError, NativeModule};
