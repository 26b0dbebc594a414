//! Occupancy control, dispenser timing, and event fan-out for `SmartQueue`.
//!
//! This crate owns everything that runs inside the control loop: the
//! room/queue controller, the dispenser state machine, the viewer
//! broadcaster, and the loop that drives them from device polls and
//! transport commands.
//!
//! # Modules
//!
//! - [`broadcast`] -- Bounded set of viewer channels with keepalive.
//! - [`clock`] -- Monotonic clock and elapsed-time poll schedules.
//! - [`command`] -- [`LoopCommand`] messages and the [`CommandSender`] handle.
//! - [`config`] -- Configuration loading from `smartqueue.yaml`.
//! - [`controller`] -- Room occupancy, the wait queue, and event emission.
//! - [`devices`] -- Hardware capability traits plus in-memory devices.
//! - [`dispenser`] -- Engage/return/cooldown state machine.
//! - [`indicator`] -- Event kind to light/tone mapping.
//! - [`proximity`] -- Distance sample filtering.
//! - [`runner`] -- The control loop.
//!
//! [`LoopCommand`]: command::LoopCommand
//! [`CommandSender`]: command::CommandSender

pub mod broadcast;
pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod devices;
pub mod dispenser;
pub mod indicator;
pub mod proximity;
pub mod runner;
