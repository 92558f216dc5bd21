use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use timelapse_common::frame::FramePayload;
use timelapse_common::messages::{ClientMessage, ServerMessage};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app::AppState;

/// GET /timelapse: upgrade to the control channel
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// One connected rendering client: change signals go out, frames come in.
async fn run_session(mut socket: WebSocket, state: Arc<AppState>) {
    let mut changes = state.changes.subscribe();
    info!("rendering client connected");

    loop {
        tokio::select! {
            signal = changes.recv() => {
                let Some(msg) = outgoing_signal(signal) else {
                    break;
                };
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = reply_for(&state, &text).await {
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket receive failed");
                    break;
                }
            }
        }
    }

    info!("rendering client disconnected");
}

/// Message to forward for one broadcast receive, or `None` once the channel closes.
/// Missed signals collapse into one request for the current frame.
fn outgoing_signal(signal: Result<ServerMessage, RecvError>) -> Option<ServerMessage> {
    match signal {
        Ok(msg) => Some(msg),
        Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "client lagged behind change signals");
            Some(ServerMessage::Changed)
        }
        Err(RecvError::Closed) => None,
    }
}

/// Handle one text message from the client, returning the status message to
/// send back, if any.
pub async fn reply_for(state: &AppState, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "unrecognized client message");
            return Some(ServerMessage::warn(format!("unrecognized message: {e}")));
        }
    };

    match message {
        ClientMessage::NewFrame { image } => {
            let result = state.sequencer.submit(FramePayload::new(image)).await;
            if !state.verbose {
                return None;
            }
            Some(match result {
                Ok(frame) => ServerMessage::log(format!("{} exported", frame.file_name)),
                Err(e) => ServerMessage::warn(e.to_string()),
            })
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to encode server message");
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use timelapse_common::config::OutputConfig;
    use timelapse_sequencer::{spawn_sequencer, FrameSequencer};

    const PNG_FRAME: &str = "data:image/png;base64,iVBORw0KGgo=";

    async fn state_in(dir: &std::path::Path, verbose: bool) -> AppState {
        let config = OutputConfig {
            dir: dir.to_path_buf(),
            pad_length: 3,
            ..OutputConfig::default()
        };
        let seq = FrameSequencer::open(&config).await.unwrap();
        let (handle, _task) = spawn_sequencer(seq, verbose);
        AppState::new(handle, verbose)
    }

    fn new_frame(image: &str) -> String {
        serde_json::to_string(&ClientMessage::NewFrame {
            image: image.into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn exported_frame_is_announced() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_in(tmp.path(), true).await;

        let reply = reply_for(&state, &new_frame(PNG_FRAME)).await;
        let Some(ServerMessage::Log { msg }) = reply else {
            panic!("expected log reply, got {reply:?}");
        };
        assert!(msg.ends_with("000.png exported"));
        assert!(tmp.path().join("000.png").is_file());
    }

    #[tokio::test]
    async fn failed_frame_is_reported_as_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_in(tmp.path(), true).await;

        let reply = reply_for(&state, &new_frame("data:image/png;base64,%%%")).await;
        assert!(matches!(reply, Some(ServerMessage::Warn { .. })));

        let reply = reply_for(&state, &new_frame(PNG_FRAME)).await;
        let Some(ServerMessage::Log { msg }) = reply else {
            panic!("expected log reply, got {reply:?}");
        };
        assert!(msg.ends_with("000.png exported"));
    }

    #[tokio::test]
    async fn quiet_mode_sends_no_status() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_in(tmp.path(), false).await;

        assert_eq!(reply_for(&state, &new_frame(PNG_FRAME)).await, None);
        assert!(tmp.path().join("000.png").is_file());
    }

    #[test]
    fn lagged_receiver_gets_one_change_signal() {
        assert_eq!(
            outgoing_signal(Err(RecvError::Lagged(3))),
            Some(ServerMessage::Changed)
        );
        assert_eq!(outgoing_signal(Err(RecvError::Closed)), None);
        assert_eq!(
            outgoing_signal(Ok(ServerMessage::Changed)),
            Some(ServerMessage::Changed)
        );
    }

    #[tokio::test]
    async fn slow_client_sees_a_single_signal_after_lagging() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(2);
        for _ in 0..5 {
            tx.send(ServerMessage::Changed).unwrap();
        }

        assert_eq!(outgoing_signal(rx.recv().await), Some(ServerMessage::Changed));
        assert!(matches!(rx.recv().await, Ok(ServerMessage::Changed)));
        assert!(matches!(rx.recv().await, Ok(ServerMessage::Changed)));
        drop(tx);
        assert_eq!(outgoing_signal(rx.recv().await), None);
    }

    #[tokio::test]
    async fn garbage_message_gets_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_in(tmp.path(), false).await;

        let reply = reply_for(&state, "{not json").await;
        assert!(matches!(reply, Some(ServerMessage::Warn { .. })));
    }
}
