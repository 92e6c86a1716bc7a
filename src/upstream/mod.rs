//! Upstream completion service integration.

pub mod client;

pub use client::{CompletionClient, DeltaReceiver, OpenAiClient, UpstreamError};
