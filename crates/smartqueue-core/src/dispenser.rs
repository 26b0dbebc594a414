//! Dispenser state machine.
//!
//! ```text
//!   Idle --(trigger accepted)--> Engaging --(engage_ms)--> Returning --(return_ms)--> Idle
//! ```
//!
//! Phase transitions are driven purely by elapsed time: [`Dispenser::tick`]
//! compares `now` against the start of the current phase on every loop
//! pass. Phase boundaries are computed from the phase start rather than from
//! the time `tick` happened to run, so a late pass may cross both
//! boundaries at once and the dispenser is never busy for longer than
//! `engage_ms + return_ms` after a start (plus one loop pass of latency).
//!
//! A trigger that arrives while the dispenser is not idle is dropped, never
//! buffered. Actuation requested by an admission follows the configured
//! [`BusyPolicy`].

use smartqueue_types::{DispenserState, Timestamp};
use tracing::debug;

use crate::config::{BusyPolicy, DispenserConfig};
use crate::devices::Actuator;

/// Result of offering a proximity trigger to the dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The trigger was accepted and a motion cycle started.
    Fired,
    /// Dropped: too soon after the last accepted trigger.
    CoolingDown,
    /// Dropped: a motion cycle is already in progress.
    Busy,
}

/// Result of an admission asking for a motion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationOutcome {
    /// A motion cycle started.
    Started,
    /// The dispenser was busy; the cycle will start once it is idle.
    Deferred,
    /// The dispenser was busy and the request was discarded.
    Dropped,
}

/// The dispenser's timing state. Owns no hardware: every method that moves
/// the servo borrows the [`Actuator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispenser {
    /// Current phase.
    state: DispenserState,

    /// When the current non-idle phase began.
    phase_started_at: Timestamp,

    /// When the last proximity trigger was accepted.
    last_trigger_at: Option<Timestamp>,

    /// Whether an admission is waiting for the dispenser to become idle.
    pending_actuation: bool,

    cooldown_ms: u64,
    engage_ms: u64,
    return_ms: u64,
    busy_policy: BusyPolicy,
}

impl Dispenser {
    /// Create an idle dispenser.
    pub const fn new(config: &DispenserConfig) -> Self {
        Self {
            state: DispenserState::Idle,
            phase_started_at: Timestamp::ZERO,
            last_trigger_at: None,
            pending_actuation: false,
            cooldown_ms: config.cooldown_ms,
            engage_ms: config.engage_ms,
            return_ms: config.return_ms,
            busy_policy: config.busy_policy,
        }
    }

    /// Current phase.
    pub const fn state(&self) -> DispenserState {
        self.state
    }

    /// When the last proximity trigger was accepted, if ever.
    pub const fn last_trigger_at(&self) -> Option<Timestamp> {
        self.last_trigger_at
    }

    /// Whether an admission's cycle is waiting to start.
    pub const fn has_pending_actuation(&self) -> bool {
        self.pending_actuation
    }

    /// Offer a proximity trigger.
    ///
    /// Accepted only when the dispenser is idle and the cooldown since the
    /// last accepted trigger has passed. The first trigger is never subject
    /// to cooldown.
    pub fn try_trigger(&mut self, now: Timestamp, actuator: &mut dyn Actuator) -> TriggerOutcome {
        if !self.state.is_idle() {
            return TriggerOutcome::Busy;
        }
        let cooling = self
            .last_trigger_at
            .is_some_and(|last| now.millis_since(last) < self.cooldown_ms);
        if cooling {
            return TriggerOutcome::CoolingDown;
        }
        self.last_trigger_at = Some(now);
        self.start_cycle(now, actuator);
        TriggerOutcome::Fired
    }

    /// Ask for a motion cycle on behalf of an admission.
    ///
    /// Does not consult or update the trigger cooldown.
    pub fn request_actuation(
        &mut self,
        now: Timestamp,
        actuator: &mut dyn Actuator,
    ) -> ActuationOutcome {
        if self.state.is_idle() {
            self.start_cycle(now, actuator);
            return ActuationOutcome::Started;
        }
        match self.busy_policy {
            BusyPolicy::QueueOne if !self.pending_actuation => {
                self.pending_actuation = true;
                ActuationOutcome::Deferred
            }
            BusyPolicy::QueueOne | BusyPolicy::Drop => ActuationOutcome::Dropped,
        }
    }

    /// Advance the phase from elapsed time. Returns the phase after the
    /// update.
    pub fn tick(&mut self, now: Timestamp, actuator: &mut dyn Actuator) -> DispenserState {
        loop {
            let elapsed = now.millis_since(self.phase_started_at);
            match self.state {
                DispenserState::Engaging if elapsed >= self.engage_ms => {
                    self.phase_started_at = self.phase_started_at.plus_millis(self.engage_ms);
                    self.state = DispenserState::Returning;
                    actuator.release();
                    debug!(at = %self.phase_started_at, "dispenser returning");
                }
                DispenserState::Returning if elapsed >= self.return_ms => {
                    self.phase_started_at = self.phase_started_at.plus_millis(self.return_ms);
                    self.state = DispenserState::Idle;
                    debug!(at = %self.phase_started_at, "dispenser idle");
                }
                DispenserState::Idle if self.pending_actuation => {
                    self.pending_actuation = false;
                    self.start_cycle(now, actuator);
                    return self.state;
                }
                _ => return self.state,
            }
        }
    }

    fn start_cycle(&mut self, now: Timestamp, actuator: &mut dyn Actuator) {
        self.state = DispenserState::Engaging;
        self.phase_started_at = now;
        actuator.engage();
        debug!(at = %now, "dispenser engaging");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{ActuatorMove, RecordingActuator};

    fn config() -> DispenserConfig {
        DispenserConfig {
            cooldown_ms: 1_200,
            engage_ms: 150,
            return_ms: 150,
            ..DispenserConfig::default()
        }
    }

    #[test]
    fn phases_follow_elapsed_time() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();

        assert_eq!(d.try_trigger(Timestamp(1_000), &mut a), TriggerOutcome::Fired);
        assert_eq!(d.state(), DispenserState::Engaging);

        assert_eq!(d.tick(Timestamp(1_149), &mut a), DispenserState::Engaging);
        assert_eq!(d.tick(Timestamp(1_150), &mut a), DispenserState::Returning);
        assert_eq!(d.tick(Timestamp(1_299), &mut a), DispenserState::Returning);
        assert_eq!(d.tick(Timestamp(1_300), &mut a), DispenserState::Idle);

        assert_eq!(a.moves(), &[ActuatorMove::Engage, ActuatorMove::Release]);
    }

    #[test]
    fn late_tick_crosses_both_boundaries() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();
        d.try_trigger(Timestamp(0), &mut a);
        assert_eq!(d.tick(Timestamp(5_000), &mut a), DispenserState::Idle);
        assert_eq!(a.moves(), &[ActuatorMove::Engage, ActuatorMove::Release]);
    }

    #[test]
    fn trigger_while_busy_is_dropped() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();
        d.try_trigger(Timestamp(0), &mut a);
        // Past the cooldown but still mid-cycle is impossible with these
        // timings, so shorten the cooldown to isolate the busy rule.
        d.cooldown_ms = 0;
        assert_eq!(d.try_trigger(Timestamp(100), &mut a), TriggerOutcome::Busy);
        assert_eq!(a.engagements(), 1);
    }

    #[test]
    fn cooldown_suppresses_second_trigger() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();
        assert_eq!(d.try_trigger(Timestamp(0), &mut a), TriggerOutcome::Fired);
        d.tick(Timestamp(400), &mut a);
        assert!(d.state().is_idle());
        assert_eq!(d.try_trigger(Timestamp(500), &mut a), TriggerOutcome::CoolingDown);
        assert_eq!(d.last_trigger_at(), Some(Timestamp(0)));
        assert_eq!(d.try_trigger(Timestamp(1_200), &mut a), TriggerOutcome::Fired);
        assert_eq!(a.engagements(), 2);
    }

    #[test]
    fn admission_actuation_ignores_cooldown() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();
        d.try_trigger(Timestamp(0), &mut a);
        d.tick(Timestamp(300), &mut a);
        assert_eq!(
            d.request_actuation(Timestamp(310), &mut a),
            ActuationOutcome::Started
        );
        assert_eq!(d.last_trigger_at(), Some(Timestamp(0)));
    }

    #[test]
    fn drop_policy_discards_busy_requests() {
        let mut d = Dispenser::new(&config());
        let mut a = RecordingActuator::default();
        d.request_actuation(Timestamp(0), &mut a);
        assert_eq!(
            d.request_actuation(Timestamp(10), &mut a),
            ActuationOutcome::Dropped
        );
        d.tick(Timestamp(1_000), &mut a);
        assert_eq!(a.engagements(), 1);
    }

    #[test]
    fn queue_one_policy_runs_one_deferred_cycle() {
        let mut d = Dispenser::new(&DispenserConfig {
            busy_policy: BusyPolicy::QueueOne,
            ..config()
        });
        let mut a = RecordingActuator::default();
        d.request_actuation(Timestamp(0), &mut a);
        assert_eq!(
            d.request_actuation(Timestamp(10), &mut a),
            ActuationOutcome::Deferred
        );
        assert_eq!(
            d.request_actuation(Timestamp(20), &mut a),
            ActuationOutcome::Dropped
        );
        assert!(d.has_pending_actuation());

        assert_eq!(d.tick(Timestamp(300), &mut a), DispenserState::Engaging);
        assert!(!d.has_pending_actuation());
        assert_eq!(d.tick(Timestamp(600), &mut a), DispenserState::Idle);
        assert_eq!(a.engagements(), 2);
    }
}
