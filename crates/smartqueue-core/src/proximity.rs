//! Distance sample filtering.
//!
//! The distance sensor reports raw centimetres. A reading only counts as a
//! crossing when it is inside the sensor's valid range and at or below the
//! trigger threshold. Missing, non-finite and out-of-range readings are
//! glitches and produce no event; they are never errors.

use crate::config::ProximityConfig;

/// Turns raw distance samples into crossing booleans.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityFilter {
    threshold_cm: f64,
    min_valid_cm: f64,
    max_valid_cm: f64,
}

impl ProximityFilter {
    /// Build a filter from configuration.
    pub const fn new(config: &ProximityConfig) -> Self {
        Self {
            threshold_cm: config.threshold_cm,
            min_valid_cm: config.min_valid_cm,
            max_valid_cm: config.max_valid_cm,
        }
    }

    /// Whether a sample is a threshold crossing.
    pub fn crossed(&self, sample_cm: Option<f64>) -> bool {
        let Some(distance) = sample_cm else {
            return false;
        };
        if !distance.is_finite() {
            return false;
        }
        if distance < self.min_valid_cm || distance > self.max_valid_cm {
            tracing::trace!(distance, "discarding out-of-range distance sample");
            return false;
        }
        distance <= self.threshold_cm
    }
}
