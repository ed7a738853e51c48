//! JSON-RPC 2.0 notifications for an embedding frontend.
//!
//! Pipeline events are turned into one-way notifications. In a browser build
//! the loader runs inside an iframe and posts each notification to the parent
//! window; native builds drain the outbox themselves.
//!
//! ## Message Flow
//!
//! ```text
//! Frontend (Parent Window)  <──postMessage──  Loader (iframe)
//!        │                                        │
//!        │ <────────── load_started ──────────────┤
//!        │ <────────── load_progress ─────────────┤
//!        │ <────────── load_stats / load_error ───┤
//! ```
//!
//! ## Notifications
//!
//! - `load_started`: `{ token }`
//! - `load_progress`: `{ token, received, total, percent }`
//! - `load_stats`: `{ token, decodeMs, decodedPoints, displayedPoints, hasColor }`
//! - `load_error`: `{ token, message, code }`

/// Notification types, event conversion and the outbox.
///
/// Handles serialisation and delivery to the parent window on WASM targets.
pub mod notifications;
