//! Event broadcaster: a bounded set of live viewer channels.
//!
//! Every controller event or status update is encoded once as a single
//! JSON line and offered to each channel's [`ViewerSink`]. Delivery is
//! best-effort: a sink that is full or closed is unregistered on the spot,
//! with no retry. A stalled viewer therefore skips events (and is
//! eventually dropped) instead of holding up the control loop or the other
//! viewers.
//!
//! The broadcaster has no liveness signal of its own, so
//! [`Broadcaster::tick_keepalive`] pings each channel on a fixed cadence.
//! A ping that cannot be written is how a dead connection is discovered.

use smartqueue_types::{ChannelId, StreamRecord, Timestamp};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BroadcastConfig;

/// Errors surfaced by the broadcaster.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// All channel slots are taken. Nothing was registered.
    #[error("viewer channel limit reached ({max} connected)")]
    ChannelLimit {
        /// The configured maximum.
        max: usize,
    },

    /// A record could not be encoded.
    #[error("failed to encode stream record: {source}")]
    Encode {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Why a non-blocking write to a viewer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The viewer is not keeping up; its buffer is full.
    #[error("viewer buffer full")]
    Full,

    /// The viewer's transport has gone away.
    #[error("viewer disconnected")]
    Closed,
}

/// Write half of one viewer connection.
pub trait ViewerSink: Send {
    /// Queue one line for the viewer without blocking.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the line cannot be queued. The
    /// broadcaster treats any error as a transport fault.
    fn try_send(&mut self, line: String) -> Result<(), SinkError>;
}

/// [`ViewerSink`] backed by a bounded tokio channel. The transport server
/// owns the receiving half and streams it to the client.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport reads from.
    ///
    /// `buffer` is clamped to at least one record.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl ViewerSink for ChannelSink {
    fn try_send(&mut self, line: String) -> Result<(), SinkError> {
        self.tx.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Public description of a live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel identifier.
    pub id: ChannelId,
    /// When the viewer subscribed.
    pub connected_at: Timestamp,
    /// When the last keepalive was sent (the subscribe time until the
    /// first ping).
    pub last_keepalive_sent_at: Timestamp,
}

/// A registered viewer.
#[derive(Debug)]
struct ViewerChannel<S> {
    info: ChannelInfo,
    sink: S,
}

/// Fan-out of events to a bounded set of viewers.
#[derive(Debug)]
pub struct Broadcaster<S = ChannelSink> {
    max_channels: usize,
    keepalive_interval_ms: u64,
    channels: Vec<ViewerChannel<S>>,
}

impl<S: ViewerSink> Broadcaster<S> {
    /// Create a broadcaster with no channels.
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            max_channels: usize::try_from(config.max_channels).unwrap_or(usize::MAX),
            keepalive_interval_ms: config.keepalive_interval_ms,
            channels: Vec::new(),
        }
    }

    /// Register a viewer.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::ChannelLimit`] if the maximum number of
    /// channels is already connected. The sink is dropped unregistered.
    pub fn subscribe(&mut self, sink: S, now: Timestamp) -> Result<ChannelId, BroadcastError> {
        if self.channels.len() >= self.max_channels {
            info!(max = self.max_channels, "refusing viewer: channel limit reached");
            return Err(BroadcastError::ChannelLimit {
                max: self.max_channels,
            });
        }
        let id = ChannelId::new();
        self.channels.push(ViewerChannel {
            info: ChannelInfo {
                id,
                connected_at: now,
                last_keepalive_sent_at: now,
            },
            sink,
        });
        info!(channel = %id, live = self.channels.len(), "viewer subscribed");
        Ok(id)
    }

    /// Remove a viewer. Returns whether it was registered; removing an
    /// unknown channel is a no-op.
    pub fn unsubscribe(&mut self, id: ChannelId) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c.info.id != id);
        let removed = self.channels.len() < before;
        if removed {
            info!(channel = %id, live = self.channels.len(), "viewer unsubscribed");
        }
        removed
    }

    /// Offer a record to every viewer. Viewers whose sink fails are
    /// unregistered. Returns the number of viewers that accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Encode`] if the record cannot be encoded;
    /// no viewer is touched in that case.
    pub fn publish(&mut self, record: &StreamRecord) -> Result<usize, BroadcastError> {
        let line = record.to_line()?;
        let mut delivered = 0_usize;
        self.channels.retain_mut(|channel| {
            match channel.sink.try_send(line.clone()) {
                Ok(()) => {
                    delivered = delivered.saturating_add(1);
                    true
                }
                Err(e) => {
                    debug!(
                        channel = %channel.info.id,
                        error = %e,
                        "dropping viewer after failed send"
                    );
                    false
                }
            }
        });
        Ok(delivered)
    }

    /// Send one record to a single viewer. Returns whether it was
    /// delivered; a failed send unregisters the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Encode`] if the record cannot be encoded.
    pub fn send_to(
        &mut self,
        id: ChannelId,
        record: &StreamRecord,
    ) -> Result<bool, BroadcastError> {
        let line = record.to_line()?;
        let Some(channel) = self.channels.iter_mut().find(|c| c.info.id == id) else {
            return Ok(false);
        };
        match channel.sink.try_send(line) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(channel = %id, error = %e, "dropping viewer after failed send");
                self.channels.retain(|c| c.info.id != id);
                Ok(false)
            }
        }
    }

    /// Ping every viewer whose last keepalive is at least one interval
    /// old. Viewers that cannot take the ping are unregistered. Returns the
    /// number of pings delivered.
    pub fn tick_keepalive(&mut self, now: Timestamp) -> usize {
        let interval = self.keepalive_interval_ms;
        let is_due =
            |info: &ChannelInfo| now.millis_since(info.last_keepalive_sent_at) >= interval;
        if !self.channels.iter().any(|c| is_due(&c.info)) {
            return 0;
        }
        let line = match (StreamRecord::Keepalive { timestamp: now }).to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode keepalive");
                return 0;
            }
        };

        let mut sent = 0_usize;
        self.channels.retain_mut(|channel| {
            if !is_due(&channel.info) {
                return true;
            }
            match channel.sink.try_send(line.clone()) {
                Ok(()) => {
                    channel.info.last_keepalive_sent_at = now;
                    sent = sent.saturating_add(1);
                    true
                }
                Err(e) => {
                    debug!(
                        channel = %channel.info.id,
                        error = %e,
                        "dropping viewer after failed keepalive"
                    );
                    false
                }
            }
        });
        sent
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no viewer is connected.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// The configured maximum number of channels.
    pub const fn max_channels(&self) -> usize {
        self.max_channels
    }

    /// Descriptions of the live channels, oldest subscription first.
    pub fn channels(&self) -> impl Iterator<Item = ChannelInfo> + '_ {
        self.channels.iter().map(|c| c.info)
    }
}
