//! Device capability traits and in-memory implementations.
//!
//! The controller never talks to hardware directly. The identity reader,
//! distance sensor, dispenser servo and indicator light/buzzer are each
//! reached through one narrow trait, so the controller and control loop can
//! be exercised without hardware. Every method is non-blocking: a driver
//! that has nothing to report returns `None` immediately.
//!
//! The scripted and recording implementations here back the tests and the
//! simulated engine.

use std::collections::VecDeque;

use smartqueue_types::IndicatorCode;

/// Source of raw identity tokens (card reader).
pub trait IdentityGate: Send {
    /// Return the next scanned token, if a card was read since the last
    /// poll. The token is unvalidated.
    fn poll_token(&mut self) -> Option<String>;
}

/// Source of distance samples (ultrasonic sensor).
pub trait ProximityMonitor: Send {
    /// Take one distance sample in centimetres. `None` means no echo.
    fn sample_cm(&mut self) -> Option<f64>;
}

/// The dispenser servo. A dumb mover: the controller decides when each
/// phase starts.
pub trait Actuator: Send {
    /// Move to the engaged position.
    fn engage(&mut self);

    /// Move back to the home position.
    fn release(&mut self);
}

/// The color light and buzzer.
pub trait Indicator: Send {
    /// Render a code.
    fn show(&mut self, code: IndicatorCode);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Identity gate that replays a fixed list of raw tokens, one per poll.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGate {
    pending: VecDeque<String>,
}

impl ScriptedGate {
    /// Create a gate that will yield `tokens` in order.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Queue another raw token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.pending.push_back(token.into());
    }
}

impl IdentityGate for ScriptedGate {
    fn poll_token(&mut self) -> Option<String> {
        self.pending.pop_front()
    }
}

/// Proximity monitor that replays a fixed list of samples, then reports
/// no echo forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProximity {
    samples: VecDeque<Option<f64>>,
}

impl ScriptedProximity {
    /// Create a monitor that will yield `samples` in order.
    pub fn new(samples: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

impl ProximityMonitor for ScriptedProximity {
    fn sample_cm(&mut self) -> Option<f64> {
        self.samples.pop_front().flatten()
    }
}

/// One command received by a [`RecordingActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorMove {
    /// [`Actuator::engage`] was called.
    Engage,
    /// [`Actuator::release`] was called.
    Release,
}

/// Actuator that records every command.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    moves: Vec<ActuatorMove>,
}

impl RecordingActuator {
    /// Commands received so far, oldest first.
    pub fn moves(&self) -> &[ActuatorMove] {
        &self.moves
    }

    /// Number of engage commands received.
    pub fn engagements(&self) -> usize {
        self.moves
            .iter()
            .filter(|m| **m == ActuatorMove::Engage)
            .count()
    }
}

impl Actuator for RecordingActuator {
    fn engage(&mut self) {
        self.moves.push(ActuatorMove::Engage);
    }

    fn release(&mut self) {
        self.moves.push(ActuatorMove::Release);
    }
}

/// Indicator that records every code shown.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    shown: Vec<IndicatorCode>,
}

impl RecordingIndicator {
    /// Codes shown so far, oldest first.
    pub fn shown(&self) -> &[IndicatorCode] {
        &self.shown
    }
}

impl Indicator for RecordingIndicator {
    fn show(&mut self, code: IndicatorCode) {
        self.shown.push(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_gate_yields_in_order_then_nothing() {
        let mut gate = ScriptedGate::new(["A", "B"]);
        assert_eq!(gate.poll_token().as_deref(), Some("A"));
        gate.push("C");
        assert_eq!(gate.poll_token().as_deref(), Some("B"));
        assert_eq!(gate.poll_token().as_deref(), Some("C"));
        assert_eq!(gate.poll_token(), None);
    }

    #[test]
    fn scripted_proximity_flattens_missing_samples() {
        let mut monitor = ScriptedProximity::new([Some(5.0), None, Some(50.0)]);
        assert_eq!(monitor.sample_cm(), Some(5.0));
        assert_eq!(monitor.sample_cm(), None);
        assert_eq!(monitor.sample_cm(), Some(50.0));
        assert_eq!(monitor.sample_cm(), None);
    }

    #[test]
    fn recording_actuator_counts_engagements() {
        let mut actuator = RecordingActuator::default();
        actuator.engage();
        actuator.release();
        actuator.engage();
        assert_eq!(actuator.engagements(), 2);
        assert_eq!(actuator.moves().len(), 3);
    }
}
