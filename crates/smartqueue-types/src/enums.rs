//! Enumeration types shared by the controller, broadcaster and viewers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The kind of state change reported to viewers and the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A visitor entered the room, either directly or from the queue.
    Admitted,
    /// The room was full and the visitor was appended to the wait queue.
    Queued,
    /// The scan could not be honoured (see [`RejectReason`]). No state
    /// changed.
    Rejected,
    /// An occupant left the room.
    Exited,
    /// A proximity trigger was accepted and the dispenser started moving.
    TriggerFired,
}

impl EventKind {
    /// All event kinds, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Admitted,
        Self::Queued,
        Self::Rejected,
        Self::Exited,
        Self::TriggerFired,
    ];
}

// ---------------------------------------------------------------------------
// Dispenser
// ---------------------------------------------------------------------------

/// Phase of the mechanical dispenser.
///
/// `Idle` is both the initial state and the terminal state of every
/// motion cycle: `Idle -> Engaging -> Returning -> Idle`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum DispenserState {
    /// At rest in the home position.
    #[default]
    Idle,
    /// Holding the engaged (drop) position.
    Engaging,
    /// Travelling back to the home position.
    Returning,
}

impl DispenserState {
    /// Whether the dispenser is at rest and may start a new cycle.
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Why a scan produced a [`EventKind::Rejected`] event.
///
/// Only used for logs and API responses; the wire event carries the kind
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum RejectReason {
    /// The raw token did not parse as a card UID.
    MalformedToken,
    /// The room and the wait queue are both full.
    QueueFull,
    /// The token is already waiting in the queue.
    AlreadyQueued,
    /// The token is already inside and re-scans do not check out.
    AlreadyInside,
}
