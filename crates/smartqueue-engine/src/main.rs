//! `SmartQueue` controller binary.
//!
//! Wires the control loop, simulated devices, and HTTP transport server
//! together and runs until Ctrl-C or a `quit` on the console.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `smartqueue.yaml` (or `SMARTQUEUE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the controller, broadcaster, and command channel
//! 4. Start the HTTP server
//! 5. Start the console devices and the Ctrl-C watcher
//! 6. Run the control loop
//! 7. Stop the server and log the result

mod console;
mod error;
mod status_callback;

use std::path::PathBuf;
use std::sync::Arc;

use smartqueue_core::broadcast::Broadcaster;
use smartqueue_core::clock::MonotonicClock;
use smartqueue_core::command::{CommandSender, command_channel};
use smartqueue_core::config::GateConfig;
use smartqueue_core::controller::Controller;
use smartqueue_core::runner::{self, Sensors};
use smartqueue_server::server::ServerConfig;
use smartqueue_server::state::AppState;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::{LogActuator, LogIndicator};
use crate::error::EngineError;
use crate::status_callback::StatusCallback;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "smartqueue.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, server startup, or the control loop
/// fails to start.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("smartqueue-engine starting");
    info!(
        source = %config_source,
        capacity = config.occupancy.capacity,
        queue_capacity = config.occupancy.queue_capacity,
        busy_policy = ?config.dispenser.busy_policy,
        cooldown_ms = config.dispenser.cooldown_ms,
        max_channels = config.broadcast.max_channels,
        "Configuration loaded"
    );
    info!(
        mode = config.network.mode_name(),
        ssid = config.network.ssid(),
        "Network configured"
    );

    // 3. Controller, broadcaster, command channel.
    let clock = MonotonicClock::start();
    let mut controller = Controller::new(
        &config.occupancy,
        &config.dispenser,
        LogActuator::new(&config.dispenser),
        LogIndicator,
    )
    .with_started_at(clock.started_at());
    let mut broadcaster = Broadcaster::new(&config.broadcast);
    let (commands, mut command_rx) = command_channel(config.control.command_buffer);

    // 4. HTTP server.
    let app_state = Arc::new(AppState::new(
        commands.clone(),
        controller.status(clock.now(), 0),
        config.broadcast.channel_buffer,
    ));
    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let server_handle = smartqueue_server::startup::spawn_server(
        ServerConfig::from(&config.http),
        Arc::clone(&app_state),
        async move {
            // Either a send or a drop of the sender means stop.
            let _ = server_stopped.await;
        },
    )
    .map_err(|e| EngineError::Server {
        message: format!("{e}"),
    })?;

    // 5. Devices and shutdown signal.
    let (mut gate, mut proximity) = console::spawn_console(commands.clone());
    spawn_ctrl_c(commands);

    let mut callback = StatusCallback::new(app_state);

    // 6. Run the control loop.
    let summary = runner::run_control_loop(
        &mut controller,
        &mut broadcaster,
        Sensors {
            gate: &mut gate,
            proximity: &mut proximity,
        },
        &mut command_rx,
        &clock,
        &mut callback,
        &config,
    )
    .await
    .map_err(EngineError::from)?;

    // 7. Stop the server and report. Dropping the broadcaster closes every
    //    viewer stream so the graceful shutdown can finish.
    runner::log_run_end(&summary);
    drop(broadcaster);
    if stop_server.send(()).is_err() {
        warn!("HTTP server had already stopped");
    }
    if let Err(e) = server_handle.await {
        warn!(error = %e, "HTTP server task failed");
    }

    info!(
        end_reason = ?summary.end_reason,
        passes = summary.passes,
        "smartqueue-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `SMARTQUEUE_CONFIG`, else `smartqueue.yaml`.
///
/// A missing default file means built-in defaults (still subject to env
/// overrides and validation). A missing file named explicitly is an error.
fn load_config() -> Result<(GateConfig, String), EngineError> {
    if let Ok(path) = std::env::var("SMARTQUEUE_CONFIG") {
        let path = PathBuf::from(path);
        let config = GateConfig::from_file(&path)?;
        return Ok((config, path.display().to_string()));
    }

    let path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if path.exists() {
        let config = GateConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        Ok((GateConfig::parse("")?, "defaults".to_owned()))
    }
}

/// Send a shutdown command on the first Ctrl-C.
fn spawn_ctrl_c(commands: CommandSender) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                if let Err(e) = commands.shutdown().await {
                    warn!(error = %e, "shutdown not delivered");
                }
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });
}
