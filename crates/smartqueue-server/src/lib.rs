//! Transport server for the `SmartQueue` controller.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **SSE endpoint** (`/events`) streaming controller events, periodic
//!   keepalives, and an opening status snapshot to each viewer
//! - **REST endpoints** for status and for staff actions (manual scan,
//!   exit, queue removal)
//! - **HTML dashboard** (`GET /`) that follows the event stream
//!
//! # Architecture
//!
//! The server owns no controller state. Staff actions and viewer
//! subscriptions are sent to the control loop as commands; status reads
//! come from a snapshot the loop refreshes after every pass. A viewer that
//! would exceed the broadcaster's channel limit gets HTTP 503.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod sse;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
