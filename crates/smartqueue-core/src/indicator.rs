//! Event kind to indicator code mapping.
//!
//! The mapping is a pure function of [`EventKind`], total over every kind,
//! so the light and buzzer always agree with what viewers are told.
//!
//! | Kind | Color | Tone |
//! |------|-------|------|
//! | `Admitted` | green | 2000 Hz, 150 ms |
//! | `Queued` | blue | 1000 Hz, 200 ms |
//! | `Rejected` | red | 400 Hz, 600 ms |
//! | `Exited` | white | none |
//! | `TriggerFired` | cyan | 2500 Hz, 40 ms |

use smartqueue_types::{EventKind, IndicatorCode, Rgb, Tone};

const GREEN: Rgb = Rgb::new(0, 255, 0);
const BLUE: Rgb = Rgb::new(0, 0, 255);
const RED: Rgb = Rgb::new(255, 0, 0);
const WHITE: Rgb = Rgb::new(255, 255, 255);
const CYAN: Rgb = Rgb::new(0, 255, 255);

/// The indicator code rendered for an event kind.
pub const fn indicator_code(kind: EventKind) -> IndicatorCode {
    match kind {
        EventKind::Admitted => IndicatorCode {
            color: GREEN,
            tone: Some(Tone {
                frequency_hz: 2_000,
                duration_ms: 150,
            }),
        },
        EventKind::Queued => IndicatorCode {
            color: BLUE,
            tone: Some(Tone {
                frequency_hz: 1_000,
                duration_ms: 200,
            }),
        },
        EventKind::Rejected => IndicatorCode {
            color: RED,
            tone: Some(Tone {
                frequency_hz: 400,
                duration_ms: 600,
            }),
        },
        EventKind::Exited => IndicatorCode {
            color: WHITE,
            tone: None,
        },
        EventKind::TriggerFired => IndicatorCode {
            color: CYAN,
            tone: Some(Tone {
                frequency_hz: 2_500,
                duration_ms: 40,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_kind_has_a_distinct_code() {
        let codes: HashSet<IndicatorCode> =
            EventKind::ALL.iter().map(|k| indicator_code(*k)).collect();
        assert_eq!(codes.len(), EventKind::ALL.len());
    }

    #[test]
    fn mapping_is_stable() {
        for kind in EventKind::ALL {
            assert_eq!(indicator_code(kind), indicator_code(kind));
        }
    }

    #[test]
    fn success_and_error_patterns() {
        assert_eq!(indicator_code(EventKind::Admitted).color, GREEN);
        assert_eq!(indicator_code(EventKind::Rejected).color, RED);
        assert!(indicator_code(EventKind::Exited).tone.is_none());
    }
}
