//! Shared type definitions for the SmartQueue occupancy controller.
//!
//! This crate is the single source of truth for the data that crosses
//! component boundaries: controller events, the records written to viewer
//! streams, and the status snapshot. Types flow to `TypeScript` via
//! `ts-rs` for the viewer dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers (viewer channel identifiers)
//! - [`enums`] -- Event kinds, dispenser phases, rejection reasons
//! - [`structs`] -- Visitors, events, indicator codes, stream records
//! - [`time`] -- Monotonic millisecond timestamps
//! - [`token`] -- Validated card UIDs

pub mod enums;
pub mod ids;
pub mod structs;
pub mod time;
pub mod token;

// Re-export all public types at crate root for convenience.
pub use enums::{DispenserState, EventKind, RejectReason};
pub use ids::ChannelId;
pub use structs::{Event, IndicatorCode, Rgb, StatusSnapshot, StreamRecord, Tone, Visitor};
pub use time::Timestamp;
pub use token::{TokenError, VisitorToken};
