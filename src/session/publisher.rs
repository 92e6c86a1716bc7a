//! Per-connection publisher: replays a session's chunk log from an offset,
//! then tails live growth until the session reaches a terminal state.
//!
//! Each attach gets its own publisher task and channel. Publishers never
//! mutate the session, so any number can tail the same generation
//! concurrently and reconnect races are harmless.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::store::{Chunk, Session, Terminal};

/// One wire record of the event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// One produced chunk, in increasing `chunkIndex` order.
    Content {
        content: String,
        #[serde(rename = "chunkIndex")]
        chunk_index: u64,
    },
    /// Successful completion. Emitted exactly once, last.
    Done,
    /// Failed completion. Emitted exactly once, last.
    Error { error: String },
}

impl From<Chunk> for StreamEvent {
    fn from(chunk: Chunk) -> Self {
        StreamEvent::Content {
            content: chunk.content,
            chunk_index: chunk.index,
        }
    }
}

impl From<Terminal> for StreamEvent {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Completed => StreamEvent::Done,
            Terminal::Error(error) => StreamEvent::Error { error },
        }
    }
}

/// Attach a publisher to `session` starting at chunk index `from_index`,
/// streaming events to the returned receiver.
///
/// Replays every chunk at index >= `from_index` that already exists, then
/// waits on the session's notifier for new appends. The terminal event is
/// always the last item before the channel closes. Dropping the receiver
/// (client disconnect) stops the publisher task on its next send or wakeup;
/// the producer and session state are unaffected.
pub fn attach(session: Arc<Session>, from_index: u64) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut next = from_index;

        loop {
            // Single-lock snapshot: chunks and terminal state observed at the
            // same instant, so a chunk appended before the terminal flag can
            // never be skipped.
            let (chunks, terminal) = session.snapshot_from(next).await;

            for chunk in chunks {
                next = chunk.index + 1;
                if tx.send(chunk.into()).await.is_err() {
                    // Receiver dropped, stop publishing.
                    debug!(session_id = %session.id(), "Publisher client went away");
                    return;
                }
            }

            if let Some(terminal) = terminal {
                let _ = tx.send(terminal.into()).await;
                debug!(session_id = %session.id(), "Publisher reached terminal state");
                return;
            }

            // Register the waiter before re-checking, so an append landing
            // between the snapshot above and the await below still wakes us.
            let updated = session.updated();
            if session.has_update(next).await {
                continue;
            }
            tokio::select! {
                _ = updated => {}
                _ = tx.closed() => {
                    debug!(session_id = %session.id(), "Publisher client went away");
                    return;
                }
            }
        }
    });

    rx
}
