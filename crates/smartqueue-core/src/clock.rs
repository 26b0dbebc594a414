//! Monotonic clock and elapsed-time schedules.
//!
//! The clock is the single source of `now` for the control loop. Nothing in
//! the core sleeps on a timer: timed behaviour (dispenser phases, sensor
//! polling, keepalive pings) is decided by comparing `now` against stored
//! timestamps on every loop pass.

use tokio::time::Instant;

use chrono::{DateTime, Utc};
use smartqueue_types::Timestamp;

/// Monotonic millisecond clock anchored at construction.
///
/// Built on tokio's [`Instant`], so a paused test runtime controls it.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    /// Monotonic origin.
    origin: Instant,

    /// Wall-clock time at the origin, for display only.
    started_at: DateTime<Utc>,
}

impl MonotonicClock {
    /// Start a clock at zero.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Milliseconds elapsed since the clock started.
    ///
    /// Saturates at `u64::MAX` (roughly 584 million years of uptime).
    pub fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_millis();
        Timestamp::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    /// Wall-clock time the clock started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Fixed-cadence schedule evaluated against elapsed time.
///
/// The first call to [`due`](Self::due) always fires; afterwards it fires
/// once at least `interval_ms` has elapsed since the last firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Minimum spacing between firings.
    interval_ms: u64,

    /// When the schedule last fired.
    last: Option<Timestamp>,
}

impl PollSchedule {
    /// Create a schedule that has never fired.
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    /// Whether the schedule fires at `now`. Records the firing if so.
    pub fn due(&mut self, now: Timestamp) -> bool {
        let fire = self
            .last
            .is_none_or(|last| now.millis_since(last) >= self.interval_ms);
        if fire {
            self.last = Some(now);
        }
        fire
    }

    /// The configured interval.
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
