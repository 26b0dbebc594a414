//! Commands sent to the control loop.
//!
//! The control loop is the only owner of controller and broadcaster state.
//! Everything else (HTTP handlers, the console, the shutdown signal) talks
//! to it by sending a [`LoopCommand`] over a bounded channel and, where an
//! answer is needed, awaiting a oneshot reply. [`CommandSender`] wraps that
//! protocol in async methods.

use smartqueue_types::{ChannelId, VisitorToken};
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::{BroadcastError, ChannelSink};
use crate::controller::{ExitOutcome, ScanOutcome};

/// A request for the control loop.
#[derive(Debug)]
pub enum LoopCommand {
    /// A manual identity scan with a raw, unvalidated token.
    Scan {
        /// The raw token.
        token: String,
        /// Where to send the result.
        reply: oneshot::Sender<ScanOutcome>,
    },

    /// An anonymous exit signal.
    Exit {
        /// Where to send the result.
        reply: oneshot::Sender<ExitOutcome>,
    },

    /// Remove a waiting visitor from the queue.
    RemoveVisitor {
        /// The visitor to remove.
        token: VisitorToken,
        /// Whether the visitor was found.
        reply: oneshot::Sender<bool>,
    },

    /// Register a viewer channel.
    Subscribe {
        /// Write half of the viewer connection.
        sink: ChannelSink,
        /// The new channel id, or the refusal.
        reply: oneshot::Sender<Result<ChannelId, BroadcastError>>,
    },

    /// Unregister a viewer channel. Unknown ids are ignored.
    Unsubscribe {
        /// The channel to remove.
        channel: ChannelId,
    },

    /// Stop the control loop.
    Shutdown,
}

/// Errors returned by [`CommandSender`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The control loop has exited and no longer accepts commands.
    #[error("control loop is not running")]
    LoopStopped,

    /// The broadcaster refused a subscription.
    #[error(transparent)]
    Refused(#[from] BroadcastError),
}

/// Cloneable handle for sending commands to the control loop.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<LoopCommand>,
}

/// Create a command channel with room for `buffer` pending commands.
pub fn command_channel(buffer: usize) -> (CommandSender, mpsc::Receiver<LoopCommand>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (CommandSender { tx }, rx)
}

impl CommandSender {
    /// Submit a manual scan and wait for its outcome.
    pub async fn scan(&self, token: impl Into<String>) -> Result<ScanOutcome, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(LoopCommand::Scan {
            token: token.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_closed| CommandError::LoopStopped)
    }

    /// Signal an exit and wait for its outcome.
    pub async fn exit(&self) -> Result<ExitOutcome, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(LoopCommand::Exit { reply }).await?;
        rx.await.map_err(|_closed| CommandError::LoopStopped)
    }

    /// Remove a visitor. Returns whether they were present.
    pub async fn remove_visitor(&self, token: VisitorToken) -> Result<bool, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(LoopCommand::RemoveVisitor { token, reply }).await?;
        rx.await.map_err(|_closed| CommandError::LoopStopped)
    }

    /// Register a viewer.
    pub async fn subscribe(&self, sink: ChannelSink) -> Result<ChannelId, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(LoopCommand::Subscribe { sink, reply }).await?;
        let id = rx.await.map_err(|_closed| CommandError::LoopStopped)??;
        Ok(id)
    }

    /// Unregister a viewer without waiting.
    ///
    /// Used from drop guards. If the command buffer is full the request is
    /// discarded; the broadcaster drops the channel on its next failed
    /// write anyway.
    pub fn unsubscribe_now(&self, channel: ChannelId) {
        if let Err(e) = self.tx.try_send(LoopCommand::Unsubscribe { channel }) {
            tracing::debug!(channel = %channel, error = %e, "unsubscribe not delivered");
        }
    }

    /// Ask the control loop to stop.
    pub async fn shutdown(&self) -> Result<(), CommandError> {
        self.send(LoopCommand::Shutdown).await
    }

    /// Whether the control loop has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: LoopCommand) -> Result<(), CommandError> {
        self.tx
            .send(command)
            .await
            .map_err(|_closed| CommandError::LoopStopped)
    }
}
