//! Core data structures: visitors, events, indicator codes, and the
//! records written to viewer streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{DispenserState, EventKind};
use crate::time::Timestamp;
use crate::token::VisitorToken;

// ---------------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------------

/// A person waiting for a free slot.
///
/// Created when a scan cannot be admitted immediately; destroyed on
/// admission or on explicit removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Visitor {
    /// The card that was scanned.
    pub token: VisitorToken,
    /// When the visitor joined the queue.
    pub enqueued_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A controller state change.
///
/// Carries the post-change occupancy, queue length and dispenser state so
/// a viewer can render the room from any single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Occupants inside after the change.
    pub occupancy_count: u32,
    /// Visitors waiting after the change.
    pub queue_length: u32,
    /// Dispenser phase after the change.
    pub dispenser_state: DispenserState,
    /// Controller clock time of the change.
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Indicator
// ---------------------------------------------------------------------------

/// An RGB LED color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Build a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A buzzer tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Tone {
    /// Tone frequency in hertz.
    pub frequency_hz: u16,
    /// How long the tone sounds, in milliseconds.
    pub duration_ms: u16,
}

/// What the indicator renders for one event: a color, optionally with a
/// tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IndicatorCode {
    /// LED color.
    pub color: Rgb,
    /// Buzzer tone, if any.
    pub tone: Option<Tone>,
}

// ---------------------------------------------------------------------------
// Status and stream records
// ---------------------------------------------------------------------------

/// Point-in-time view of the controller, served by the status endpoint and
/// sent to each viewer when it subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatusSnapshot {
    /// Occupants inside.
    pub occupancy_count: u32,
    /// Maximum simultaneous occupants.
    pub capacity: u32,
    /// Visitors waiting.
    pub queue_length: u32,
    /// Maximum waiting visitors.
    pub queue_capacity: u32,
    /// Current dispenser phase.
    pub dispenser_state: DispenserState,
    /// Viewer channels currently connected.
    pub live_channels: u32,
    /// Controller clock time of the snapshot.
    pub timestamp: Timestamp,
    /// Wall-clock time the controller started.
    pub started_at: DateTime<Utc>,
}

/// One newline-delimited record on a viewer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// A controller state change.
    Event(Event),
    /// Liveness ping.
    Keepalive {
        /// Controller clock time of the ping.
        timestamp: Timestamp,
    },
    /// Current state. Sent right after subscribing, and to every viewer
    /// when the state changes without an event (queue removals, dispenser
    /// phase steps).
    Snapshot(StatusSnapshot),
}

impl StreamRecord {
    /// Encode the record as a single line of JSON (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if encoding fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
