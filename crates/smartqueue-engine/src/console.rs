//! Console-driven simulated devices.
//!
//! On a development machine the card reader and distance sensor are
//! replaced by lines typed on stdin, and the servo and indicator by log
//! lines. Input:
//!
//! | Line | Effect |
//! |------|--------|
//! | `<hex uid>` | card scan, e.g. `04A1B2C3` or `04:a1:b2:c3` |
//! | `wave [cm]` | one distance sample (default 5 cm) |
//! | `exit` | exit signal |
//! | `quit` | stop the engine |
//! | `help` | list commands |

use smartqueue_core::command::CommandSender;
use smartqueue_core::config::DispenserConfig;
use smartqueue_core::devices::{Actuator, IdentityGate, Indicator, ProximityMonitor};
use smartqueue_types::IndicatorCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Distance reported by a bare `wave`.
const DEFAULT_WAVE_CM: f64 = 5.0;

/// Buffered console input per device.
const INPUT_BUFFER: usize = 16;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
enum ConsoleLine {
    Scan(String),
    Wave(f64),
    Exit,
    Quit,
    Help,
    Blank,
    Unknown(String),
}

fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    let mut words = line.split_whitespace();
    match words.next() {
        None => ConsoleLine::Blank,
        Some("exit") => ConsoleLine::Exit,
        Some("quit") => ConsoleLine::Quit,
        Some("help") => ConsoleLine::Help,
        Some("wave") => match words.next() {
            None => ConsoleLine::Wave(DEFAULT_WAVE_CM),
            Some(cm) => cm
                .parse()
                .map_or_else(|_e| ConsoleLine::Unknown(line.to_owned()), ConsoleLine::Wave),
        },
        Some(_) => ConsoleLine::Scan(line.to_owned()),
    }
}

/// Card reader fed from the console.
pub struct ConsoleGate {
    rx: mpsc::Receiver<String>,
}

impl IdentityGate for ConsoleGate {
    fn poll_token(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Distance sensor fed from the console. Reports no echo unless a `wave`
/// sample is waiting.
pub struct ConsoleProximity {
    rx: mpsc::Receiver<f64>,
}

impl ProximityMonitor for ConsoleProximity {
    fn sample_cm(&mut self) -> Option<f64> {
        self.rx.try_recv().ok()
    }
}

/// Start reading stdin on a background task.
///
/// Exit and quit lines go straight to the control loop through `commands`;
/// scans and samples are queued for the returned devices to hand over when
/// polled.
pub fn spawn_console(commands: CommandSender) -> (ConsoleGate, ConsoleProximity) {
    let (token_tx, token_rx) = mpsc::channel(INPUT_BUFFER);
    let (sample_tx, sample_rx) = mpsc::channel(INPUT_BUFFER);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("Console ready; type `help` for commands");
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Console input closed");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    return;
                }
            };
            match parse_line(&line) {
                ConsoleLine::Scan(token) => {
                    if token_tx.try_send(token).is_err() {
                        warn!("scan dropped: reader input backlog full");
                    }
                }
                ConsoleLine::Wave(cm) => {
                    if sample_tx.try_send(cm).is_err() {
                        warn!("sample dropped: sensor input backlog full");
                    }
                }
                ConsoleLine::Exit => match commands.exit().await {
                    Ok(outcome) => info!(
                        departed = ?outcome.departed.as_ref().map(ToString::to_string),
                        admitted = outcome.admitted.len(),
                        "exit processed"
                    ),
                    Err(e) => warn!(error = %e, "exit not processed"),
                },
                ConsoleLine::Quit => {
                    if let Err(e) = commands.shutdown().await {
                        warn!(error = %e, "shutdown not delivered");
                    }
                    return;
                }
                ConsoleLine::Help => info!("commands: <hex uid> | wave [cm] | exit | quit"),
                ConsoleLine::Blank => {}
                ConsoleLine::Unknown(line) => warn!(%line, "unrecognised console input"),
            }
        }
    });

    (
        ConsoleGate { rx: token_rx },
        ConsoleProximity { rx: sample_rx },
    )
}

/// Servo that logs its moves.
pub struct LogActuator {
    home_angle: u8,
    trigger_angle: u8,
}

impl LogActuator {
    /// Create an actuator with the configured angles.
    pub const fn new(config: &DispenserConfig) -> Self {
        Self {
            home_angle: config.home_angle,
            trigger_angle: config.trigger_angle,
        }
    }
}

impl Actuator for LogActuator {
    fn engage(&mut self) {
        info!(angle = self.trigger_angle, "servo engage");
    }

    fn release(&mut self) {
        info!(angle = self.home_angle, "servo release");
    }
}

/// Light and buzzer that log what they would show.
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn show(&mut self, code: IndicatorCode) {
        let (tone_hz, tone_ms) = code
            .tone
            .map_or((0, 0), |t| (t.frequency_hz, t.duration_ms));
        info!(
            r = code.color.r,
            g = code.color.g,
            b = code.color.b,
            tone_hz,
            tone_ms,
            "indicator"
        );
    }
}
