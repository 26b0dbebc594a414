//! Shared application state for the transport server.
//!
//! Handlers never touch controller or broadcaster state. Mutations travel
//! to the control loop through the [`CommandSender`]; reads are served from
//! a status snapshot the loop refreshes after every pass.

use std::sync::Arc;

use smartqueue_core::command::CommandSender;
use smartqueue_types::StatusSnapshot;
use tokio::sync::RwLock;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the control loop.
    pub commands: CommandSender,
    /// Latest status written by the control loop.
    pub status: Arc<RwLock<StatusSnapshot>>,
    /// Buffered records per viewer before it counts as stalled.
    pub channel_buffer: usize,
}

impl AppState {
    /// Create application state seeded with an initial status.
    pub fn new(commands: CommandSender, initial: StatusSnapshot, channel_buffer: usize) -> Self {
        Self {
            commands,
            status: Arc::new(RwLock::new(initial)),
            channel_buffer,
        }
    }
}
