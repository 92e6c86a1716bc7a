//! sse-resume: resumable SSE gateway for streaming completions.
//!
//! A start request launches a background producer that streams a completion
//! from an upstream API into an append-only, in-memory chunk log. Any number
//! of clients can attach to the session over SSE, replay from an arbitrary
//! chunk offset, and tail live output — reconnecting never loses
//! already-produced content.

pub mod config;
pub mod server;
pub mod session;
pub mod upstream;
