//! Loop callback that refreshes the server's status snapshot.

use std::sync::Arc;

use smartqueue_core::runner::LoopCallback;
use smartqueue_server::state::AppState;
use smartqueue_types::StatusSnapshot;

/// Copies each pass's status into the shared [`AppState`].
pub struct StatusCallback {
    state: Arc<AppState>,
}

impl StatusCallback {
    /// Create a callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl LoopCallback for StatusCallback {
    fn on_pass(&mut self, status: &StatusSnapshot) {
        // try_write so the loop never waits on a reader; if a handler holds
        // the lock, the next pass catches up.
        if let Ok(mut snap) = self.state.status.try_write() {
            *snap = status.clone();
        }
    }
}
