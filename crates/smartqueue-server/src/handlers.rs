//! REST endpoint handlers.
//!
//! Reads are served from the status snapshot in [`AppState`]. Every
//! mutation is forwarded to the control loop as a command and answered
//! with its outcome.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | HTML dashboard fed by `/events` |
//! | `GET` | `/api/status` | Latest status snapshot |
//! | `POST` | `/api/scan` | Manual identity scan |
//! | `POST` | `/api/exit` | Exit signal |
//! | `DELETE` | `/api/queue/{token}` | Remove a waiting visitor |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use serde::{Deserialize, Serialize};
use smartqueue_core::controller::{ExitOutcome, ScanOutcome};
use smartqueue_types::{RejectReason, VisitorToken};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/scan`.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Raw card UID as typed or read.
    pub token: String,
}

/// Result of a manual scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanResponse {
    /// The visitor entered.
    Admitted,
    /// The visitor is waiting at `position` (1 is next).
    Queued {
        /// Queue position.
        position: u32,
    },
    /// The scan was refused.
    Rejected {
        /// Why.
        reason: RejectReason,
    },
    /// An occupant checked out by re-scanning.
    Exited,
}

impl From<ScanOutcome> for ScanResponse {
    fn from(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Admitted => Self::Admitted,
            ScanOutcome::Queued { position } => Self::Queued { position },
            ScanOutcome::Rejected(reason) => Self::Rejected { reason },
            ScanOutcome::Exited => Self::Exited,
        }
    }
}

/// Result of an exit signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResponse {
    /// Who left, if anyone was inside.
    pub departed: Option<VisitorToken>,
    /// Who was admitted from the queue as a result.
    pub admitted: Vec<VisitorToken>,
}

impl From<ExitOutcome> for ExitResponse {
    fn from(outcome: ExitOutcome) -> Self {
        Self {
            departed: outcome.departed,
            admitted: outcome.admitted,
        }
    }
}

/// Result of a queue removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    /// The visitor that was removed.
    pub removed: VisitorToken,
}

// ---------------------------------------------------------------------------
// GET / -- dashboard
// ---------------------------------------------------------------------------

/// Serve the live dashboard.
///
/// The page renders the current status server-side and then follows
/// `/events` with `EventSource`, so it stays current without polling.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.read().await.clone();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>SmartQueue</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 720px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; }}
        .stat {{ font-size: 2.5rem; margin: 0.25rem 0 1.25rem; }}
        .label {{ color: #8b949e; text-transform: uppercase; font-size: 0.8rem; }}
        #log {{ list-style: none; padding: 0; color: #8b949e; }}
        #log li {{ padding: 0.15rem 0; }}
        #link {{ color: #f85149; }}
        #link.up {{ color: #3fb950; }}
    </style>
</head>
<body>
    <h1>SmartQueue</h1>
    <p>Stream: <span id="link">connecting</span></p>

    <div class="label">Inside</div>
    <div class="stat"><span id="occupancy">{occupancy}</span> / {capacity}</div>

    <div class="label">Waiting</div>
    <div class="stat"><span id="queue">{queue}</span> / {queue_capacity}</div>

    <div class="label">Dispenser</div>
    <div class="stat" id="dispenser">{dispenser:?}</div>

    <div class="label">Recent events</div>
    <ul id="log"></ul>

    <script>
        const log = document.getElementById('log');
        const link = document.getElementById('link');
        const set = (id, v) => {{ document.getElementById(id).textContent = v; }};
        const source = new EventSource('/events');
        source.onopen = () => {{ link.textContent = 'live'; link.className = 'up'; }};
        source.onerror = () => {{ link.textContent = 'reconnecting'; link.className = ''; }};
        source.onmessage = (msg) => {{
            const rec = JSON.parse(msg.data);
            if (rec.type === 'keepalive') return;
            set('occupancy', rec.occupancy_count);
            set('queue', rec.queue_length);
            set('dispenser', rec.dispenser_state);
            if (rec.type === 'event') {{
                const li = document.createElement('li');
                li.textContent = (rec.timestamp / 1000).toFixed(1) + 's  ' + rec.kind;
                log.prepend(li);
                while (log.children.length > 20) log.lastChild.remove();
            }}
        }};
    </script>
</body>
</html>"#,
        occupancy = status.occupancy_count,
        capacity = status.capacity,
        queue = status.queue_length,
        queue_capacity = status.queue_capacity,
        dispenser = status.dispenser_state,
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the latest status snapshot.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.read().await.clone();
    Json(status)
}

// ---------------------------------------------------------------------------
// POST /api/scan
// ---------------------------------------------------------------------------

/// Submit a manual identity scan, as staff would at the desk.
///
/// Malformed tokens are not an HTTP error: the controller rejects them
/// like any bad card read, and the response says so.
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let outcome = state.commands.scan(body.token).await?;
    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// POST /api/exit
// ---------------------------------------------------------------------------

/// Signal that a visitor has left.
pub async fn exit(State(state): State<Arc<AppState>>) -> Result<Json<ExitResponse>, ApiError> {
    let outcome = state.commands.exit().await?;
    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// DELETE /api/queue/{token}
// ---------------------------------------------------------------------------

/// Remove a waiting visitor from the queue.
pub async fn remove_from_queue(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let token = VisitorToken::parse(&raw)?;
    if state.commands.remove_visitor(token.clone()).await? {
        Ok(Json(RemoveResponse { removed: token }))
    } else {
        Err(ApiError::NotFound(format!("{token} is not waiting")))
    }
}
