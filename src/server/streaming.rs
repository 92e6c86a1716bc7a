//! SSE (Server-Sent Events) rendering for publisher streams.
//!
//! Converts a channel of StreamEvents into the `data: <json>` records the
//! resumable-stream protocol puts on the wire.

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::session::publisher::StreamEvent;

/// Convert a publisher event receiver into an SSE stream.
///
/// The terminal event is the last item the publisher sends, so the SSE
/// stream (and with it the HTTP response) ends right after it. Dropping the
/// returned stream drops the receiver, which stops the publisher task.
pub fn events_to_sse_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(data))
    })
}
