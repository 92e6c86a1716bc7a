//! In-memory session registry and per-session chunk logs.
//!
//! A session is the server-side record of one generation: an append-only
//! sequence of content chunks plus terminal flags. The store is the single
//! owner of all sessions; producers mutate through it, publishers only read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier for a session.
pub type SessionId = Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Refusing to append an empty chunk")]
    EmptyChunk,
}

/// One unit of incrementally produced content.
///
/// Indices are zero-based, strictly increasing, and contiguous within a
/// session. A chunk is immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the session log.
    pub index: u64,

    /// Text payload. Never empty.
    pub content: String,
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The producer drained the upstream stream successfully.
    Completed,
    /// The producer failed; the message is surfaced to every publisher.
    Error(String),
}

/// Mutable interior of a session, guarded by the session's lock.
#[derive(Debug, Default)]
struct SessionState {
    chunks: Vec<Chunk>,
    completed: bool,
    error: Option<String>,
    terminal_at: Option<Instant>,
}

impl SessionState {
    fn terminal(&self) -> Option<Terminal> {
        if let Some(msg) = &self.error {
            Some(Terminal::Error(msg.clone()))
        } else if self.completed {
            Some(Terminal::Completed)
        } else {
            None
        }
    }
}

/// One in-flight or completed generation.
///
/// The chunk log is read-many/write-one: exactly one producer appends,
/// any number of publishers replay and tail. `notify` wakes tailing
/// publishers on every append and on the terminal transition.
pub struct Session {
    id: SessionId,
    state: RwLock<SessionState>,
    notify: Notify,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            state: RwLock::new(SessionState::default()),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Number of chunks produced so far.
    pub async fn len(&self) -> u64 {
        self.state.read().await.chunks.len() as u64
    }

    /// Terminal outcome, if the session has reached one.
    pub async fn terminal(&self) -> Option<Terminal> {
        self.state.read().await.terminal()
    }

    /// Consistent snapshot under a single read lock: every chunk at index
    /// >= `from` together with the terminal state observed at the same
    /// instant. Publishers rely on this to never emit a terminal event
    /// ahead of a chunk that was appended before it.
    pub async fn snapshot_from(&self, from: u64) -> (Vec<Chunk>, Option<Terminal>) {
        let state = self.state.read().await;
        let start = (from as usize).min(state.chunks.len());
        (state.chunks[start..].to_vec(), state.terminal())
    }

    /// Whether anything new exists past `next`: a chunk or a terminal state.
    pub async fn has_update(&self, next: u64) -> bool {
        let state = self.state.read().await;
        state.chunks.len() as u64 > next || state.terminal().is_some()
    }

    /// Future that resolves on the next append or terminal transition.
    ///
    /// Register the waiter *before* re-checking state, or an update landing
    /// in between is lost until the one after it.
    pub fn updated(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// Process-wide session registry.
///
/// Owns every [`Session`]; handed to the lifecycle manager and the HTTP
/// layer as an explicit dependency rather than a global.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new empty session, visible to lookups immediately.
    pub async fn create(&self) -> SessionId {
        let id = Uuid::new_v4();
        let session = Arc::new(Session::new(id));
        self.sessions.write().await.insert(id, session);
        debug!(session_id = %id, "Session created");
        id
    }

    /// Read-only handle to a session.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Append a chunk with the next sequential index, returning that index.
    ///
    /// Producer-only. Empty content is rejected; the producer filters empty
    /// deltas before calling, so hitting [`StoreError::EmptyChunk`] here
    /// indicates a decoding bug upstream of the store.
    pub async fn append(&self, id: &SessionId, content: String) -> Result<u64, StoreError> {
        if content.is_empty() {
            return Err(StoreError::EmptyChunk);
        }
        let session = self
            .get(id)
            .await
            .ok_or(StoreError::SessionNotFound(*id))?;

        let mut state = session.state.write().await;
        let index = state.chunks.len() as u64;
        state.chunks.push(Chunk { index, content });
        drop(state);

        session.notify.notify_waiters();
        Ok(index)
    }

    /// Mark a session successfully completed. First terminal write wins;
    /// later calls are no-ops.
    pub async fn mark_completed(&self, id: &SessionId) -> Result<(), StoreError> {
        let session = self
            .get(id)
            .await
            .ok_or(StoreError::SessionNotFound(*id))?;

        let mut state = session.state.write().await;
        if state.terminal().is_none() {
            state.completed = true;
            state.terminal_at = Some(Instant::now());
        }
        drop(state);

        session.notify.notify_waiters();
        Ok(())
    }

    /// Mark a session failed. First terminal write wins; later calls are
    /// no-ops.
    pub async fn mark_error(&self, id: &SessionId, message: String) -> Result<(), StoreError> {
        let session = self
            .get(id)
            .await
            .ok_or(StoreError::SessionNotFound(*id))?;

        let mut state = session.state.write().await;
        if state.terminal().is_none() {
            state.error = Some(message);
            state.terminal_at = Some(Instant::now());
        }
        drop(state);

        session.notify.notify_waiters();
        Ok(())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove a session outright. Returns whether it existed.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Evict sessions that have been terminal for at least `max_age`.
    ///
    /// In-flight sessions are never touched. Terminal state is monotonic,
    /// so a session selected here cannot become live again before removal.
    pub async fn evict_terminal(&self, max_age: Duration) -> usize {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                let state = session.state.read().await;
                if let Some(at) = state.terminal_at {
                    if at.elapsed() >= max_age {
                        expired.push(*id);
                    }
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for id in expired {
            if sessions.remove(&id).is_some() {
                evicted += 1;
            }
        }
        info!(evicted, "Evicted terminal sessions");
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::new();
        let id = store.create().await;

        let session = store.get(&id).await.expect("session visible after create");
        assert_eq!(session.id(), id);
        assert_eq!(session.len().await, 0);
        assert!(session.terminal().await.is_none());

        let unknown = Uuid::new_v4();
        assert!(store.get(&unknown).await.is_none());
    }

    #[tokio::test]
    async fn test_append_assigns_contiguous_indices() {
        let store = SessionStore::new();
        let id = store.create().await;

        assert_eq!(store.append(&id, "a".into()).await.unwrap(), 0);
        assert_eq!(store.append(&id, "b".into()).await.unwrap(), 1);
        assert_eq!(store.append(&id, "c".into()).await.unwrap(), 2);

        let session = store.get(&id).await.unwrap();
        let (chunks, terminal) = session.snapshot_from(0).await;
        let indices: Vec<u64> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(terminal.is_none());
    }

    #[tokio::test]
    async fn test_append_rejects_empty_content() {
        let store = SessionStore::new();
        let id = store.create().await;

        let err = store.append(&id, String::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyChunk));
        assert_eq!(store.get(&id).await.unwrap().len().await, 0);
    }

    #[tokio::test]
    async fn test_append_unknown_session() {
        let store = SessionStore::new();
        let err = store
            .append(&Uuid::new_v4(), "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_from_offset() {
        let store = SessionStore::new();
        let id = store.create().await;
        for text in ["H", "el", "lo"] {
            store.append(&id, text.into()).await.unwrap();
        }

        let session = store.get(&id).await.unwrap();
        let (chunks, _) = session.snapshot_from(1).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].content, "el");

        // Offset past the end yields nothing rather than panicking.
        let (chunks, _) = session.snapshot_from(10).await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_first_terminal_write_wins() {
        let store = SessionStore::new();
        let id = store.create().await;

        store.mark_completed(&id).await.unwrap();
        store.mark_error(&id, "too late".into()).await.unwrap();

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.terminal().await, Some(Terminal::Completed));

        let id2 = store.create().await;
        store.mark_error(&id2, "boom".into()).await.unwrap();
        store.mark_completed(&id2).await.unwrap();

        let session2 = store.get(&id2).await.unwrap();
        assert_eq!(
            session2.terminal().await,
            Some(Terminal::Error("boom".into()))
        );
    }

    #[tokio::test]
    async fn test_evict_terminal_skips_live_sessions() {
        let store = SessionStore::new();
        let live = store.create().await;
        let done = store.create().await;
        store.mark_completed(&done).await.unwrap();

        // Zero max-age: terminal sessions are immediately eligible.
        let evicted = store.evict_terminal(Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert!(store.get(&done).await.is_none());
        assert!(store.get(&live).await.is_some());
    }

    #[tokio::test]
    async fn test_evict_respects_max_age() {
        let store = SessionStore::new();
        let done = store.create().await;
        store.mark_completed(&done).await.unwrap();

        let evicted = store.evict_terminal(Duration::from_secs(3600)).await;
        assert_eq!(evicted, 0);
        assert!(store.get(&done).await.is_some());
    }
}
