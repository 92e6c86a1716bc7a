//! HTTP surface of the gateway.
//!
//! - [`api`]: Request/response types and route handlers
//! - [`streaming`]: SSE rendering of publisher event streams

pub mod api;
pub mod streaming;
