//! Axum router construction.
//!
//! Assembles the REST and SSE routes into a single [`Router`] with CORS
//! enabled so a dashboard served elsewhere can reach the API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sse;
use crate::state::AppState;

/// Build the complete router.
///
/// - `GET /` -- live HTML dashboard
/// - `GET /events` -- SSE event stream
/// - `GET /api/status` -- latest status snapshot
/// - `POST /api/scan` -- manual identity scan
/// - `POST /api/exit` -- exit signal
/// - `DELETE /api/queue/{token}` -- remove a waiting visitor
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/events", get(sse::events))
        .route("/api/status", get(handlers::status))
        .route("/api/scan", post(handlers::scan))
        .route("/api/exit", post(handlers::exit))
        .route("/api/queue/{token}", delete(handlers::remove_from_queue))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
