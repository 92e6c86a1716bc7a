//! Session lifecycle: binds start requests to session creation plus
//! producer launch, and attach requests to publishers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::session::producer::run_producer;
use crate::session::publisher::{self, StreamEvent};
use crate::session::store::{SessionId, SessionStore, StoreError};
use crate::upstream::CompletionClient;

/// Creates sessions, launches producers, and hands out publishers.
///
/// Owns the producer tasks it spawns in the sense that their lifetime is
/// tied to upstream completion, not to any HTTP connection.
pub struct SessionManager {
    store: Arc<SessionStore>,
    client: Arc<dyn CompletionClient>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>, client: Arc<dyn CompletionClient>) -> Self {
        Self { store, client }
    }

    /// Create a session and launch exactly one producer for it.
    ///
    /// Returns as soon as the session is registered; production happens in a
    /// detached task, so the caller's response never waits on the upstream.
    pub async fn start(&self, message: String) -> SessionId {
        let id = self.store.create().await;
        info!(session_id = %id, "Starting session");

        let store = self.store.clone();
        let client = self.client.clone();
        tokio::spawn(run_producer(store, client, id, message));

        id
    }

    /// Attach a publisher to an existing session at `from_index`.
    pub async fn attach(
        &self,
        id: &SessionId,
        from_index: u64,
    ) -> Result<mpsc::Receiver<StreamEvent>, StoreError> {
        let session = self
            .store
            .get(id)
            .await
            .ok_or(StoreError::SessionNotFound(*id))?;
        Ok(publisher::attach(session, from_index))
    }

    /// Evict sessions that have been terminal for at least `max_age`.
    ///
    /// Retention is unbounded unless the operator opts in; this is the
    /// explicit hook the opt-in sweep task calls.
    pub async fn evict_terminal(&self, max_age: Duration) -> usize {
        self.store.evict_terminal(max_age).await
    }
}
