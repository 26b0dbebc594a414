//! Occupancy and queue controller.
//!
//! The controller owns every piece of admission state: who is inside, who
//! is waiting, and the dispenser's phase. It turns identity scans, exit
//! signals and proximity triggers into admission decisions, drives the
//! actuator and indicator, and records an [`Event`] for each state change.
//! The control loop drains those events and hands them to the broadcaster.
//!
//! # Invariants
//!
//! - The number of occupants never exceeds `capacity`. Occupancy is the
//!   length of the occupant list, so it can never go negative.
//! - The wait queue never exceeds `queue_capacity` and is strictly FIFO.
//! - A token appears at most once across occupants and the queue.
//! - The queue is only non-empty while the room is full: every exit is
//!   followed by [`Controller::admit_from_queue`], so a direct admission
//!   never overtakes a waiting visitor.
//!
//! Capacity and queue overflow are normal outcomes reported as
//! [`EventKind::Rejected`], never errors.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use smartqueue_types::{
    DispenserState, Event, EventKind, RejectReason, StatusSnapshot, Timestamp, Visitor,
    VisitorToken,
};
use tracing::{debug, info, warn};

use crate::config::{DispenserConfig, OccupancyConfig};
use crate::devices::{Actuator, Indicator};
use crate::dispenser::{ActuationOutcome, Dispenser, TriggerOutcome};
use crate::indicator::indicator_code;

/// Result of an identity scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The visitor entered the room.
    Admitted,
    /// The visitor joined the queue at this 1-based position.
    Queued {
        /// Position in the queue, 1 being next in line.
        position: u32,
    },
    /// The scan was refused. No state changed.
    Rejected(RejectReason),
    /// The card belonged to an occupant, who has now checked out.
    Exited,
}

/// Result of an exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// The occupant who left, or `None` if the room was already empty.
    pub departed: Option<VisitorToken>,
    /// Visitors admitted from the queue into the freed slots, in order.
    pub admitted: Vec<VisitorToken>,
}

/// The occupancy and queue controller.
///
/// Generic over its actuator and indicator so tests can inspect what the
/// hardware was told to do.
#[derive(Debug)]
pub struct Controller<A, I> {
    /// Maximum simultaneous occupants.
    capacity: usize,

    /// Maximum waiting visitors.
    queue_capacity: usize,

    /// Whether re-scanning an occupant's card checks them out.
    rescan_exits: bool,

    /// Occupants in order of admission.
    occupants: VecDeque<VisitorToken>,

    /// Waiting visitors, head is next in line.
    queue: VecDeque<Visitor>,

    /// Dispenser timing state.
    dispenser: Dispenser,

    actuator: A,
    indicator: I,

    /// Events emitted since the last drain, oldest first.
    outbox: Vec<Event>,

    /// Wall-clock start time for status reports.
    started_at: DateTime<Utc>,
}

impl<A: Actuator, I: Indicator> Controller<A, I> {
    /// Create a controller with an empty room and queue.
    pub fn new(
        occupancy: &OccupancyConfig,
        dispenser: &DispenserConfig,
        actuator: A,
        indicator: I,
    ) -> Self {
        Self {
            capacity: usize::try_from(occupancy.capacity).unwrap_or(usize::MAX),
            queue_capacity: usize::try_from(occupancy.queue_capacity).unwrap_or(usize::MAX),
            rescan_exits: occupancy.rescan_exits,
            occupants: VecDeque::new(),
            queue: VecDeque::new(),
            dispenser: Dispenser::new(dispenser),
            actuator,
            indicator,
            outbox: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Set the wall-clock start time reported in status snapshots.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Handle a raw token from the identity reader.
    ///
    /// Admits the visitor if there is room, queues them if the queue has
    /// room, and rejects them otherwise. Malformed tokens are rejected
    /// without touching any state.
    pub fn on_identity_scan(&mut self, raw: &str, now: Timestamp) -> ScanOutcome {
        let token = match VisitorToken::parse(raw) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "rejecting malformed token");
                return self.reject(RejectReason::MalformedToken, now);
            }
        };

        if let Some(index) = self.occupants.iter().position(|t| *t == token) {
            if !self.rescan_exits {
                return self.reject(RejectReason::AlreadyInside, now);
            }
            let departed = self.occupants.remove(index);
            self.finish_exit(departed, now);
            return ScanOutcome::Exited;
        }

        if self.queue.iter().any(|v| v.token == token) {
            return self.reject(RejectReason::AlreadyQueued, now);
        }

        if self.occupants.len() < self.capacity {
            self.admit(token, now);
            return ScanOutcome::Admitted;
        }

        if self.queue.len() < self.queue_capacity {
            info!(%token, at = %now, "room full, visitor queued");
            self.queue.push_back(Visitor {
                token,
                enqueued_at: now,
            });
            self.emit(EventKind::Queued, now);
            return ScanOutcome::Queued {
                position: count_u32(self.queue.len()),
            };
        }

        self.reject(RejectReason::QueueFull, now)
    }

    /// Handle an anonymous exit signal.
    ///
    /// The longest-present occupant leaves (nobody leaves if the room is
    /// empty), an `Exited` event is emitted, and freed slots are filled
    /// from the queue.
    pub fn on_exit_signal(&mut self, now: Timestamp) -> ExitOutcome {
        let departed = self.occupants.pop_front();
        self.finish_exit(departed, now)
    }

    /// Admit waiting visitors, oldest first, while there is room.
    ///
    /// Returns the tokens admitted, in admission order.
    pub fn admit_from_queue(&mut self, now: Timestamp) -> Vec<VisitorToken> {
        let mut admitted = Vec::new();
        while self.occupants.len() < self.capacity {
            let Some(visitor) = self.queue.pop_front() else {
                break;
            };
            debug!(
                token = %visitor.token,
                waited_ms = now.millis_since(visitor.enqueued_at),
                "admitting from queue"
            );
            admitted.push(visitor.token.clone());
            self.admit(visitor.token, now);
        }
        admitted
    }

    /// Handle a proximity crossing.
    ///
    /// Ignored while the dispenser is mid-cycle or within the cooldown of
    /// the last accepted trigger. Otherwise starts a dispenser cycle and
    /// emits `TriggerFired`.
    pub fn on_proximity_trigger(&mut self, now: Timestamp) -> TriggerOutcome {
        let outcome = self.dispenser.try_trigger(now, &mut self.actuator);
        match outcome {
            TriggerOutcome::Fired => {
                info!(at = %now, "proximity trigger accepted");
                self.emit(EventKind::TriggerFired, now);
            }
            TriggerOutcome::CoolingDown => debug!(at = %now, "trigger ignored: cooldown"),
            TriggerOutcome::Busy => debug!(at = %now, "trigger ignored: dispenser busy"),
        }
        outcome
    }

    /// Advance the dispenser's timed phases. Never emits events.
    pub fn tick(&mut self, now: Timestamp) -> DispenserState {
        self.dispenser.tick(now, &mut self.actuator)
    }

    /// Remove a waiting visitor. Returns whether one was removed.
    pub fn remove_visitor(&mut self, token: &VisitorToken, now: Timestamp) -> bool {
        let Some(index) = self.queue.iter().position(|v| v.token == *token) else {
            return false;
        };
        // `VecDeque::remove` shifts later entries without reordering them.
        let removed = self.queue.remove(index);
        info!(%token, at = %now, removed = removed.is_some(), "visitor removed from queue");
        removed.is_some()
    }

    /// Take the events emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Point-in-time status.
    pub fn status(&self, now: Timestamp, live_channels: usize) -> StatusSnapshot {
        StatusSnapshot {
            occupancy_count: count_u32(self.occupants.len()),
            capacity: count_u32(self.capacity),
            queue_length: count_u32(self.queue.len()),
            queue_capacity: count_u32(self.queue_capacity),
            dispenser_state: self.dispenser.state(),
            live_channels: count_u32(live_channels),
            timestamp: now,
            started_at: self.started_at,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Occupants inside.
    pub fn occupancy_count(&self) -> usize {
        self.occupants.len()
    }

    /// Visitors waiting.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Waiting visitors, next in line first.
    pub fn waiting(&self) -> impl Iterator<Item = &Visitor> {
        self.queue.iter()
    }

    /// Occupants, longest present first.
    pub fn occupants(&self) -> impl Iterator<Item = &VisitorToken> {
        self.occupants.iter()
    }

    /// Current dispenser phase.
    pub const fn dispenser_state(&self) -> DispenserState {
        self.dispenser.state()
    }

    /// The actuator.
    pub const fn actuator(&self) -> &A {
        &self.actuator
    }

    /// The indicator.
    pub const fn indicator(&self) -> &I {
        &self.indicator
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn admit(&mut self, token: VisitorToken, now: Timestamp) {
        info!(%token, at = %now, "visitor admitted");
        self.occupants.push_back(token);
        self.emit(EventKind::Admitted, now);
        match self.dispenser.request_actuation(now, &mut self.actuator) {
            ActuationOutcome::Started => {}
            ActuationOutcome::Deferred => debug!("dispenser busy, admission actuation deferred"),
            ActuationOutcome::Dropped => debug!("dispenser busy, admission actuation dropped"),
        }
    }

    fn finish_exit(&mut self, departed: Option<VisitorToken>, now: Timestamp) -> ExitOutcome {
        match &departed {
            Some(token) => info!(%token, at = %now, "occupant exited"),
            None => debug!(at = %now, "exit signal with empty room"),
        }
        self.emit(EventKind::Exited, now);
        let admitted = self.admit_from_queue(now);
        ExitOutcome { departed, admitted }
    }

    fn reject(&mut self, reason: RejectReason, now: Timestamp) -> ScanOutcome {
        info!(?reason, at = %now, "scan rejected");
        self.emit(EventKind::Rejected, now);
        ScanOutcome::Rejected(reason)
    }

    fn emit(&mut self, kind: EventKind, now: Timestamp) {
        self.indicator.show(indicator_code(kind));
        self.outbox.push(Event {
            kind,
            occupancy_count: count_u32(self.occupants.len()),
            queue_length: count_u32(self.queue.len()),
            dispenser_state: self.dispenser.state(),
            timestamp: now,
        });
    }
}

/// Saturating `usize` to `u32` conversion for counts on the wire.
fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
