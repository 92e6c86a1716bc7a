//! Shared test helpers: a scripted upstream client and terminal waiting.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use sse_resume::session::{SessionId, SessionStore, Terminal};
use sse_resume::upstream::{CompletionClient, DeltaReceiver, UpstreamError};
use tokio::sync::mpsc;

/// Upstream stand-in that replays a fixed script of deltas.
pub struct ScriptedClient {
    script: Vec<Result<String, String>>,
    fail_open: Option<String>,
    step_delay: Option<Duration>,
}

impl ScriptedClient {
    /// Streams each fragment, then closes cleanly.
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            fail_open: None,
            step_delay: None,
        }
    }

    /// Fails before any fragment is produced (e.g. a non-success status).
    pub fn failing_open(message: &str) -> Self {
        Self {
            script: Vec::new(),
            fail_open: Some(message.to_string()),
            step_delay: None,
        }
    }

    /// Streams the fragments, then breaks with a transport-style error.
    pub fn breaking_after(fragments: &[&str], message: &str) -> Self {
        let mut script: Vec<Result<String, String>> =
            fragments.iter().map(|f| Ok(f.to_string())).collect();
        script.push(Err(message.to_string()));
        Self {
            script,
            fail_open: None,
            step_delay: None,
        }
    }

    /// Sleep between fragments so tests can attach mid-production.
    pub fn paced(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn stream_completion(&self, _message: &str) -> Result<DeltaReceiver, UpstreamError> {
        if let Some(message) = &self.fail_open {
            return Err(UpstreamError::Status {
                status: 502,
                message: message.clone(),
            });
        }

        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let delay = self.step_delay;
        tokio::spawn(async move {
            for step in script {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let item = step.map_err(|m| UpstreamError::Status {
                    status: 502,
                    message: m,
                });
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Poll until the session reaches a terminal state.
pub async fn wait_for_terminal(store: &SessionStore, id: &SessionId) -> Terminal {
    for _ in 0..400 {
        if let Some(session) = store.get(id).await {
            if let Some(terminal) = session.terminal().await {
                return terminal;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached a terminal state");
}
