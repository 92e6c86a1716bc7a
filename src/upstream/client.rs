//! Streaming client for an OpenAI-compatible chat completion API.
//!
//! Opens `POST {base_url}/chat/completions` with `stream: true` and decodes
//! the SSE byte stream into plain text deltas. Only the textual delta is
//! surfaced; everything else in the upstream chunk is ignored.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::UpstreamConfig;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Channel of incremental text deltas. An `Err` item is terminal: the
/// upstream stream is broken and no further deltas follow.
pub type DeltaReceiver = mpsc::Receiver<Result<String, UpstreamError>>;

/// A completion backend that produces a lazy, finite sequence of text
/// fragments. Abstracted so the producer can be driven by a scripted
/// implementation in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open one streaming completion for `message`.
    ///
    /// An `Err` return means the call never got a usable stream (transport
    /// failure, non-success status, missing credentials).
    async fn stream_completion(&self, message: &str) -> Result<DeltaReceiver, UpstreamError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiClient {
    /// Build a client from configuration, reading the API key from the
    /// environment variable the config names. A missing key is not fatal
    /// here; it surfaces as an error on the first request, mirroring how
    /// the upstream SDKs behave.
    pub fn new(config: &UpstreamConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = config.api_key_env,
                "API key environment variable not set; completions will fail"
            );
        }
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_completion(&self, message: &str) -> Result<DeltaReceiver, UpstreamError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| UpstreamError::MissingApiKey(self.api_key_env.clone()))?;

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": message}],
            "stream": true,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for line in lines.feed(bytes) {
                            match parse_data_line(&line) {
                                DataLine::Delta(text) => {
                                    if tx.send(Ok(text)).await.is_err() {
                                        // Receiver dropped, stop reading.
                                        return;
                                    }
                                }
                                DataLine::Done => return,
                                DataLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(UpstreamError::Request(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Accumulates raw bytes and yields complete, non-blank lines.
///
/// SSE frames arrive split at arbitrary byte boundaries — including inside
/// a multi-byte UTF-8 character — so the buffer holds raw bytes and decodes
/// only complete lines. A complete line always ends on a character boundary.
struct SseLineBuffer {
    buffer: BytesMut,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    fn feed(&mut self, chunk: Bytes) -> Vec<String> {
        self.buffer.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

/// What one SSE line amounts to.
enum DataLine {
    /// A textual delta extracted from `choices[0].delta.content`.
    Delta(String),
    /// The `[DONE]` sentinel: upstream is finished.
    Done,
    /// Anything else: comments, events without a delta, malformed JSON.
    Skip,
}

fn parse_data_line(line: &str) -> DataLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return DataLine::Skip;
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
        return DataLine::Done;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            // A single undecodable fragment is not fatal to the stream.
            warn!(error = %e, "Skipping malformed upstream fragment");
            return DataLine::Skip;
        }
    };

    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) => DataLine::Delta(text.to_string()),
        None => DataLine::Skip,
    }
}
