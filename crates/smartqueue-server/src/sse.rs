//! Server-Sent Events stream of controller events.
//!
//! Each client of `GET /events` is one broadcaster channel. The handler asks
//! the control loop for a slot; if none is free the request fails with 503
//! before any stream is opened. Every record the broadcaster writes (the
//! opening snapshot, events and keepalives) becomes one SSE `data:` line.
//!
//! When the client goes away axum drops the stream, and the guard inside it
//! releases the slot.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, Sse};
use futures::Stream;
use smartqueue_core::broadcast::ChannelSink;
use smartqueue_core::command::CommandSender;
use smartqueue_types::ChannelId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Releases a broadcaster slot when the stream is dropped.
struct ChannelGuard {
    commands: CommandSender,
    channel: ChannelId,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        debug!(channel = %self.channel, "viewer stream closed");
        self.commands.unsubscribe_now(self.channel);
    }
}

/// Subscribe to the event stream.
///
/// # Route
///
/// `GET /events`
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let (sink, rx) = ChannelSink::channel(state.channel_buffer);
    let channel = state.commands.subscribe(sink).await?;
    debug!(%channel, "viewer stream opened");

    let guard = ChannelGuard {
        commands: state.commands.clone(),
        channel,
    };
    Ok(Sse::new(record_stream(rx, guard)))
}

/// Turn the channel's receiver into SSE events. Ends when the broadcaster
/// drops the channel.
fn record_stream(
    rx: mpsc::Receiver<String>,
    guard: ChannelGuard,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let line = rx.recv().await?;
        Some((Ok(SseEvent::default().data(line)), (rx, guard)))
    })
}
