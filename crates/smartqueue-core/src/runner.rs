//! Control loop runner.
//!
//! [`run_control_loop`] is the single task that owns the controller and the
//! broadcaster. Each pass:
//!
//! 1. Drains pending [`LoopCommand`]s (manual scans, exits, removals,
//!    viewer subscriptions).
//! 2. Polls the identity gate once.
//! 3. Samples the proximity monitor if its poll interval has elapsed.
//! 4. Advances the dispenser's timed phases.
//! 5. Publishes the events emitted during the pass, in order, followed by a
//!    status snapshot if a phase step changed the state without an event.
//! 6. Sends due keepalives.
//! 7. Hands a status snapshot to the [`LoopCallback`].
//!
//! and then sleeps for the loop interval. Nothing inside a pass waits on a
//! timer, so one slow viewer or an idle sensor never delays the others.
//!
//! Viewers see every state change: events are published before any
//! snapshot that would already include them, and a queue removal is
//! followed by a snapshot straight away.
//!
//! The loop ends on [`LoopCommand::Shutdown`] or once every command sender
//! has been dropped. Events from commands handled before the shutdown are
//! still published.

use std::time::Duration;

use smartqueue_types::{StatusSnapshot, StreamRecord, Timestamp};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::clock::{MonotonicClock, PollSchedule};
use crate::command::LoopCommand;
use crate::config::GateConfig;
use crate::controller::Controller;
use crate::devices::{Actuator, IdentityGate, Indicator, ProximityMonitor};
use crate::proximity::ProximityFilter;

/// Errors that stop the control loop before it starts.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The loop settings cannot be run.
    #[error("invalid control loop settings: {reason}")]
    InvalidSettings {
        /// What is wrong.
        reason: String,
    },
}

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEndReason {
    /// A [`LoopCommand::Shutdown`] was received.
    Shutdown,
    /// Every command sender was dropped.
    CommandsClosed,
}

/// Result of a control loop run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub end_reason: LoopEndReason,
    /// Number of completed passes.
    pub passes: u64,
    /// Number of events emitted by the controller.
    pub events_emitted: u64,
    /// Status at the moment the loop stopped.
    pub final_status: StatusSnapshot,
}

/// Polled input devices. The output devices live inside the controller.
pub struct Sensors<'a> {
    /// Card reader.
    pub gate: &'a mut dyn IdentityGate,
    /// Distance sensor.
    pub proximity: &'a mut dyn ProximityMonitor,
}

/// Called at the end of every pass.
///
/// Implementations can use this to refresh a shared status snapshot for
/// readers outside the loop.
pub trait LoopCallback: Send {
    /// Called with the status after the pass.
    fn on_pass(&mut self, status: &StatusSnapshot);
}

/// A callback that does nothing.
pub struct NoOpCallback;

impl LoopCallback for NoOpCallback {
    fn on_pass(&mut self, _status: &StatusSnapshot) {}
}

/// What to do after handling a command.
enum Flow {
    Continue,
    Stop(LoopEndReason),
}

/// Run the control loop until shutdown.
///
/// # Errors
///
/// Returns [`RunnerError::InvalidSettings`] if the loop interval is zero.
/// Once running, no controller or transport error stops the loop.
pub async fn run_control_loop<A: Actuator, I: Indicator>(
    controller: &mut Controller<A, I>,
    broadcaster: &mut Broadcaster,
    sensors: Sensors<'_>,
    commands: &mut mpsc::Receiver<LoopCommand>,
    clock: &MonotonicClock,
    callback: &mut dyn LoopCallback,
    config: &GateConfig,
) -> Result<RunSummary, RunnerError> {
    let interval_ms = config.control.loop_interval_ms;
    if interval_ms == 0 {
        return Err(RunnerError::InvalidSettings {
            reason: "control.loop_interval_ms must be non-zero".to_owned(),
        });
    }

    let filter = ProximityFilter::new(&config.proximity);
    let mut proximity_schedule = PollSchedule::new(config.proximity.poll_interval_ms);
    let mut passes: u64 = 0;
    let mut events_emitted: u64 = 0;

    info!(
        loop_interval_ms = interval_ms,
        poll_interval_ms = config.proximity.poll_interval_ms,
        capacity = config.occupancy.capacity,
        queue_capacity = config.occupancy.queue_capacity,
        max_channels = config.broadcast.max_channels,
        "Control loop starting"
    );

    let end_reason = loop {
        let now = clock.now();

        // --- Commands ---
        if let Flow::Stop(reason) =
            drain_commands(controller, broadcaster, commands, now, &mut events_emitted)
        {
            publish_events(controller, broadcaster, &mut events_emitted);
            break reason;
        }

        // --- Identity gate ---
        if let Some(raw) = sensors.gate.poll_token() {
            let outcome = controller.on_identity_scan(&raw, now);
            debug!(?outcome, "card scanned");
        }

        // --- Proximity ---
        if proximity_schedule.due(now) && filter.crossed(sensors.proximity.sample_cm()) {
            controller.on_proximity_trigger(now);
        }

        // --- Dispenser phases ---
        let phase_before = controller.dispenser_state();
        let phase = controller.tick(now);

        // --- Fan-out ---
        publish_events(controller, broadcaster, &mut events_emitted);
        if phase != phase_before {
            debug!(from = ?phase_before, to = ?phase, "dispenser phase step");
            publish_status(controller, broadcaster, now);
        }
        broadcaster.tick_keepalive(now);

        // --- Status ---
        callback.on_pass(&controller.status(now, broadcaster.len()));
        passes = passes.saturating_add(1);

        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    };

    Ok(RunSummary {
        end_reason,
        passes,
        events_emitted,
        final_status: controller.status(clock.now(), broadcaster.len()),
    })
}

/// Publish the controller's pending events in order, adding them to
/// `emitted`.
fn publish_events<A: Actuator, I: Indicator>(
    controller: &mut Controller<A, I>,
    broadcaster: &mut Broadcaster,
    emitted: &mut u64,
) {
    for event in controller.drain_events() {
        *emitted = emitted.saturating_add(1);
        if let Err(e) = broadcaster.publish(&StreamRecord::Event(event)) {
            warn!(error = %e, kind = ?event.kind, "failed to publish event");
        }
    }
}

/// Publish the current status to every viewer.
fn publish_status<A: Actuator, I: Indicator>(
    controller: &Controller<A, I>,
    broadcaster: &mut Broadcaster,
    now: Timestamp,
) {
    let snapshot = StreamRecord::Snapshot(controller.status(now, broadcaster.len()));
    if let Err(e) = broadcaster.publish(&snapshot) {
        warn!(error = %e, "failed to publish status snapshot");
    }
}

fn drain_commands<A: Actuator, I: Indicator>(
    controller: &mut Controller<A, I>,
    broadcaster: &mut Broadcaster,
    commands: &mut mpsc::Receiver<LoopCommand>,
    now: Timestamp,
    events_emitted: &mut u64,
) -> Flow {
    loop {
        let command = match commands.try_recv() {
            Ok(command) => command,
            Err(TryRecvError::Empty) => return Flow::Continue,
            Err(TryRecvError::Disconnected) => {
                info!("All command senders dropped");
                return Flow::Stop(LoopEndReason::CommandsClosed);
            }
        };
        if let Flow::Stop(reason) =
            handle_command(controller, broadcaster, command, now, events_emitted)
        {
            return Flow::Stop(reason);
        }
    }
}

fn handle_command<A: Actuator, I: Indicator>(
    controller: &mut Controller<A, I>,
    broadcaster: &mut Broadcaster,
    command: LoopCommand,
    now: Timestamp,
    events_emitted: &mut u64,
) -> Flow {
    match command {
        LoopCommand::Scan { token, reply } => {
            let outcome = controller.on_identity_scan(&token, now);
            if reply.send(outcome).is_err() {
                debug!("scan requester went away before the reply");
            }
        }
        LoopCommand::Exit { reply } => {
            let outcome = controller.on_exit_signal(now);
            if reply.send(outcome).is_err() {
                debug!("exit requester went away before the reply");
            }
        }
        LoopCommand::RemoveVisitor { token, reply } => {
            let removed = controller.remove_visitor(&token, now);
            if removed {
                // No event marks a removal, so viewers get the new queue
                // length as a snapshot.
                publish_events(controller, broadcaster, events_emitted);
                publish_status(controller, broadcaster, now);
            }
            if reply.send(removed).is_err() {
                debug!("removal requester went away before the reply");
            }
        }
        LoopCommand::Subscribe { sink, reply } => {
            // Existing viewers get pending events first; the new viewer's
            // snapshot already includes them.
            publish_events(controller, broadcaster, events_emitted);
            let result = broadcaster.subscribe(sink, now);
            if let Ok(id) = &result {
                let snapshot = StreamRecord::Snapshot(controller.status(now, broadcaster.len()));
                if let Err(e) = broadcaster.send_to(*id, &snapshot) {
                    warn!(error = %e, "failed to send initial snapshot");
                }
            }
            let subscribed = result.as_ref().ok().copied();
            if reply.send(result).is_err() {
                // The viewer's request was abandoned; free the slot.
                if let Some(id) = subscribed {
                    broadcaster.unsubscribe(id);
                }
            }
        }
        LoopCommand::Unsubscribe { channel } => {
            broadcaster.unsubscribe(channel);
        }
        LoopCommand::Shutdown => {
            info!("Shutdown requested");
            return Flow::Stop(LoopEndReason::Shutdown);
        }
    }
    Flow::Continue
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        passes = summary.passes,
        events = summary.events_emitted,
        occupancy = summary.final_status.occupancy_count,
        queue_length = summary.final_status.queue_length,
        "Control loop stopped"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use smartqueue_types::{DispenserState, EventKind, VisitorToken};
    use tokio::sync::oneshot;

    use super::*;
    use crate::broadcast::ChannelSink;
    use crate::command::{CommandError, command_channel};
    use crate::controller::ScanOutcome;
    use crate::devices::{RecordingActuator, RecordingIndicator, ScriptedGate, ScriptedProximity};

    #[derive(Default)]
    struct LastStatus {
        calls: u64,
        last: Option<StatusSnapshot>,
    }

    impl LoopCallback for LastStatus {
        fn on_pass(&mut self, status: &StatusSnapshot) {
            self.calls = self.calls.saturating_add(1);
            self.last = Some(status.clone());
        }
    }

    fn test_config() -> GateConfig {
        let mut config = GateConfig::default();
        config.occupancy.capacity = 3;
        config.occupancy.queue_capacity = 10;
        config
    }

    fn controller(config: &GateConfig) -> Controller<RecordingActuator, RecordingIndicator> {
        Controller::new(
            &config.occupancy,
            &config.dispenser,
            RecordingActuator::default(),
            RecordingIndicator::default(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<StreamRecord> {
        let mut records = Vec::new();
        while let Ok(line) = rx.try_recv() {
            records.push(serde_json::from_str(&line).unwrap());
        }
        records
    }

    fn event_kinds(records: &[StreamRecord]) -> Vec<EventKind> {
        records
            .iter()
            .filter_map(|r| match r {
                StreamRecord::Event(e) => Some(e.kind),
                _ => None,
            })
            .collect()
    }

    fn snapshots(records: &[StreamRecord]) -> Vec<&StatusSnapshot> {
        records
            .iter()
            .filter_map(|r| match r {
                StreamRecord::Snapshot(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn gate_scans_reach_viewers_in_order() {
        let config = test_config();
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::new(["04A1B2C3", "04A1B2C4", "04A1B2C5", "04A1B2C6"]);
        let mut proximity = ScriptedProximity::new([]);
        let (sender, mut commands) = command_channel(8);
        let clock = MonotonicClock::start();
        let mut callback = LastStatus::default();
        let (sink, mut lines) = ChannelSink::channel(32);
        broadcaster.subscribe(sink, Timestamp::ZERO).unwrap();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            sender.shutdown().await.unwrap();
        };
        let run = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        );
        let (summary, ()) = tokio::join!(run, driver);
        let summary = summary.unwrap();

        assert_eq!(summary.end_reason, LoopEndReason::Shutdown);
        assert_eq!(summary.events_emitted, 4);
        assert_eq!(summary.final_status.occupancy_count, 3);
        assert_eq!(summary.final_status.queue_length, 1);
        assert_eq!(callback.calls, summary.passes);

        let records = drain(&mut lines);
        assert_eq!(
            event_kinds(&records),
            vec![
                EventKind::Admitted,
                EventKind::Admitted,
                EventKind::Admitted,
                EventKind::Queued,
            ]
        );
        // Admissions while the dispenser is mid-cycle are dropped.
        assert_eq!(controller.actuator().engagements(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_answered() {
        let config = test_config();
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        let mut proximity = ScriptedProximity::new([]);
        let (sender, mut commands) = command_channel(8);
        let clock = MonotonicClock::start();
        let mut callback = NoOpCallback;

        let driver = async {
            assert_eq!(sender.scan("04:A1:B2:C3").await.unwrap(), ScanOutcome::Admitted);
            assert!(matches!(
                sender.scan("not-a-card").await.unwrap(),
                ScanOutcome::Rejected(_)
            ));
            let exit = sender.exit().await.unwrap();
            assert_eq!(exit.departed.unwrap().as_str(), "04A1B2C3");
            let token = VisitorToken::parse("04A1B2C9").unwrap();
            assert!(!sender.remove_visitor(token).await.unwrap());
            drop(sender);
        };
        let run = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        );
        let (summary, ()) = tokio::join!(run, driver);
        let summary = summary.unwrap();
        assert_eq!(summary.end_reason, LoopEndReason::CommandsClosed);
        assert_eq!(summary.events_emitted, 3);
        assert_eq!(summary.final_status.occupancy_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn proximity_crossing_fires_once_per_cooldown() {
        let config = test_config();
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        // Sampled every 200ms: a glitch, then a hand held under the sensor
        // for a full second, then nothing.
        let mut proximity = ScriptedProximity::new([
            Some(0.5),
            Some(5.0),
            Some(5.0),
            Some(5.0),
            Some(5.0),
            Some(5.0),
            None,
        ]);
        let (sender, mut commands) = command_channel(8);
        let clock = MonotonicClock::start();
        let mut callback = LastStatus::default();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            sender.shutdown().await.unwrap();
        };
        let run = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        );
        let (summary, ()) = tokio::join!(run, driver);
        let summary = summary.unwrap();

        // Crossings at ~200ms..1000ms; cooldown 1200ms admits only the first.
        assert_eq!(summary.events_emitted, 1);
        assert_eq!(controller.actuator().engagements(), 1);
        assert_eq!(summary.final_status.dispenser_state, DispenserState::Idle);
        assert_eq!(
            callback.last.unwrap().dispenser_state,
            DispenserState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refused_subscription_does_not_stop_loop() {
        let mut config = test_config();
        config.broadcast.max_channels = 1;
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        let mut proximity = ScriptedProximity::new([]);
        let (sender, mut commands) = command_channel(8);
        let clock = MonotonicClock::start();
        let mut callback = NoOpCallback;

        let driver = async {
            let (first, mut first_lines) = ChannelSink::channel(8);
            let id = sender.subscribe(first).await.unwrap();
            let greeting = drain(&mut first_lines);
            assert!(matches!(greeting.first(), Some(StreamRecord::Snapshot(_))));
            let (second, _second_lines) = ChannelSink::channel(8);
            assert!(matches!(
                sender.subscribe(second).await,
                Err(CommandError::Refused(_))
            ));
            sender.unsubscribe_now(id);
            let (third, _third_lines) = ChannelSink::channel(8);
            assert!(sender.subscribe(third).await.is_ok());
            sender.shutdown().await.unwrap();
        };
        let run = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        );
        let (summary, ()) = tokio::join!(run, driver);
        assert_eq!(summary.unwrap().final_status.live_channels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removals_and_phase_steps_reach_viewers() {
        let mut config = test_config();
        config.occupancy.capacity = 1;
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        let mut proximity = ScriptedProximity::new([]);
        let (sender, mut commands) = command_channel(8);
        let clock = MonotonicClock::start();
        let mut callback = LastStatus::default();
        let (sink, mut lines) = ChannelSink::channel(32);
        broadcaster.subscribe(sink, Timestamp::ZERO).unwrap();

        let driver = async {
            assert_eq!(sender.scan("04A1B2C3").await.unwrap(), ScanOutcome::Admitted);
            assert_eq!(
                sender.scan("04A1B2C4").await.unwrap(),
                ScanOutcome::Queued { position: 1 }
            );
            let token = VisitorToken::parse("04A1B2C4").unwrap();
            assert!(sender.remove_visitor(token).await.unwrap());
            tokio::time::sleep(Duration::from_secs(2)).await;
            sender.shutdown().await.unwrap();
        };
        let run = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        );
        let (summary, ()) = tokio::join!(run, driver);
        let summary = summary.unwrap();
        assert_eq!(summary.final_status.queue_length, 0);
        assert_eq!(summary.final_status.dispenser_state, DispenserState::Idle);

        let records = drain(&mut lines);
        assert_eq!(
            event_kinds(&records),
            vec![EventKind::Admitted, EventKind::Queued]
        );

        let snaps = snapshots(&records);
        let removal = snaps.first().unwrap();
        assert_eq!(removal.queue_length, 0);
        assert_eq!(removal.occupancy_count, 1);
        assert_eq!(
            snaps.iter().map(|s| s.dispenser_state).collect::<Vec<_>>(),
            vec![
                DispenserState::Engaging,
                DispenserState::Returning,
                DispenserState::Idle,
            ]
        );

        // The viewer ends up agreeing with the controller.
        assert!(matches!(
            records.last(),
            Some(StreamRecord::Snapshot(last))
                if last.queue_length == 0 && last.dispenser_state == DispenserState::Idle
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_ahead_of_shutdown_are_published() {
        let config = test_config();
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        let mut proximity = ScriptedProximity::new([]);
        let clock = MonotonicClock::start();
        let mut callback = NoOpCallback;
        let (early, mut early_lines) = ChannelSink::channel(8);
        broadcaster.subscribe(early, Timestamp::ZERO).unwrap();

        // Queue everything up front so one drain handles it all.
        let (tx, mut commands) = mpsc::channel(8);
        let (scan_reply, scan_answer) = oneshot::channel();
        tx.send(LoopCommand::Scan {
            token: "04A1B2C3".to_owned(),
            reply: scan_reply,
        })
        .await
        .unwrap();
        let (late, mut late_lines) = ChannelSink::channel(8);
        let (subscribe_reply, subscribe_answer) = oneshot::channel();
        tx.send(LoopCommand::Subscribe {
            sink: late,
            reply: subscribe_reply,
        })
        .await
        .unwrap();
        tx.send(LoopCommand::Shutdown).await.unwrap();

        let summary = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(summary.end_reason, LoopEndReason::Shutdown);
        assert_eq!(summary.events_emitted, 1);
        assert_eq!(scan_answer.await.unwrap(), ScanOutcome::Admitted);
        assert!(subscribe_answer.await.unwrap().is_ok());

        let early = drain(&mut early_lines);
        assert_eq!(event_kinds(&early), vec![EventKind::Admitted]);

        // The late viewer's snapshot already counts the admission, so the
        // event is not repeated to it.
        let late = drain(&mut late_lines);
        assert_eq!(late.len(), 1);
        assert!(matches!(
            late.first(),
            Some(StreamRecord::Snapshot(snapshot)) if snapshot.occupancy_count == 1
        ));
    }

    #[tokio::test]
    async fn zero_interval_is_refused() {
        let mut config = test_config();
        config.control.loop_interval_ms = 0;
        let mut controller = controller(&config);
        let mut broadcaster = Broadcaster::new(&config.broadcast);
        let mut gate = ScriptedGate::default();
        let mut proximity = ScriptedProximity::new([]);
        let (_sender, mut commands) = command_channel(1);
        let clock = MonotonicClock::start();
        let mut callback = NoOpCallback;
        let result = run_control_loop(
            &mut controller,
            &mut broadcaster,
            Sensors {
                gate: &mut gate,
                proximity: &mut proximity,
            },
            &mut commands,
            &clock,
            &mut callback,
            &config,
        )
        .await;
        assert!(matches!(result, Err(RunnerError::InvalidSettings { .. })));
    }
}
