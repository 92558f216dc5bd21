use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use timelapse_common::messages::ServerMessage;
use timelapse_sequencer::{SequencerHandle, SequencerStatus};
use timelapse_watcher::ContentChanged;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::socket;

/// Change signals buffered per client before it is considered lagging.
const BROADCAST_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub sequencer: SequencerHandle,
    pub changes: broadcast::Sender<ServerMessage>,
    pub verbose: bool,
}

impl AppState {
    pub fn new(sequencer: SequencerHandle, verbose: bool) -> Self {
        let (changes, _) = broadcast::channel(BROADCAST_DEPTH);
        Self {
            sequencer,
            changes,
            verbose,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timelapse", get(socket::upgrade))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /status: sequencer progress as JSON
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SequencerStatus>, StatusCode> {
    match state.sequencer.status().await {
        Ok(status) => Ok(Json(status)),
        Err(e) => {
            error!(error = %e, "status query failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// ---------------------------------------------------------------------------
// Change fan-out
// ---------------------------------------------------------------------------

/// Relay detector signals to every connected client as `timelapse:changed`.
pub async fn forward_changes(
    mut changes: mpsc::UnboundedReceiver<ContentChanged>,
    clients: broadcast::Sender<ServerMessage>,
) {
    while let Some(ContentChanged) = changes.recv().await {
        match clients.send(ServerMessage::Changed) {
            Ok(receivers) => debug!(receivers, "requested a frame from clients"),
            Err(_) => info!("content changed but no client is connected"),
        }
    }
    debug!("change stream closed");
}
