//! Background producer: drives one upstream completion call per session.
//!
//! The producer's lifetime is bounded by the upstream stream, never by
//! client presence. A session whose clients all disconnect keeps producing;
//! that is what makes resuming possible. All side effects go through the
//! session store.

use std::sync::Arc;

use tracing::{error, info};

use crate::session::store::{SessionId, SessionStore};
use crate::upstream::CompletionClient;

/// Run one completion for `session_id`, appending every non-empty delta to
/// the session log and recording the terminal outcome.
///
/// Upstream failures are not retried: they land on the session as a terminal
/// error so every attached publisher sees them immediately.
pub async fn run_producer(
    store: Arc<SessionStore>,
    client: Arc<dyn CompletionClient>,
    session_id: SessionId,
    message: String,
) {
    info!(session_id = %session_id, "Producer starting");

    let mut rx = match client.stream_completion(&message).await {
        Ok(rx) => rx,
        Err(e) => {
            info!(session_id = %session_id, error = %e, "Upstream call failed");
            fail_session(&store, &session_id, e.to_string()).await;
            return;
        }
    };

    let mut appended = 0u64;
    while let Some(delta) = rx.recv().await {
        match delta {
            Ok(text) => {
                // Empty deltas never enter the log.
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = store.append(&session_id, text).await {
                    // The store is the producer's only collaborator; losing
                    // the session mid-production is a lifecycle bug.
                    error!(session_id = %session_id, error = %e, "Append failed, aborting producer");
                    return;
                }
                appended += 1;
            }
            Err(e) => {
                info!(session_id = %session_id, error = %e, "Upstream stream broke");
                fail_session(&store, &session_id, e.to_string()).await;
                return;
            }
        }
    }

    if let Err(e) = store.mark_completed(&session_id).await {
        error!(session_id = %session_id, error = %e, "Failed to mark session completed");
        return;
    }

    info!(session_id = %session_id, chunks = appended, "Producer finished");
}

async fn fail_session(store: &SessionStore, session_id: &SessionId, message: String) {
    if let Err(e) = store.mark_error(session_id, message).await {
        error!(session_id = %session_id, error = %e, "Failed to record session error");
    }
}
