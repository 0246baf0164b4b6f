//! Manages the browser WebSocket connection lifecycle for an interview.

use super::{
    protocol::{ClientMessage, ServerMessage, snapshot_changes},
    provider::{self, ActiveSession},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use interview_core::UiSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// The client starts and stops the interview with text messages and streams
/// microphone audio as binary frames in between. Presentation and completion
/// changes are pushed as they happen.
#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", &connection_id.to_string());
    info!("New WebSocket connection.");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));
    let mut active: Option<ActiveSession> = None;
    let mut last = UiSnapshot::default();

    loop {
        tokio::select! {
            msg_result = socket_rx.next() => {
                let Some(msg_result) = msg_result else { break };
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Start) => {
                            if let Some(previous) = active.take() {
                                warn!("Start received during an active interview, restarting");
                                previous.shutdown().await;
                            }
                            active = Some(provider::start_realtime_provider(state.clone(), socket_tx.clone()));
                            last = UiSnapshot::default();
                            let started = started_message();
                            info!(?started, "Interview started");
                            if send_msg(&mut *socket_tx.lock().await, started).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientMessage::Stop) => {
                            if let Some(session) = active.take() {
                                session.shutdown().await;
                            }
                            last = UiSnapshot::default();
                            if send_msg(&mut *socket_tx.lock().await, ServerMessage::Stopped).await.is_err() {
                                break;
                            }
                            info!("Interview stopped by client");
                        }
                        Err(e) => warn!(error = %e, "Ignoring malformed client message"),
                    },
                    Ok(Message::Binary(data)) => match &active {
                        Some(session) => {
                            if let Err(e) = session.tx.send(provider::RealtimeClientEvent::Audio(data)).await {
                                error!("Failed to send audio to provider task: {}", e);
                            }
                        }
                        None => warn!("Received audio data from client, but no interview is active."),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Client sent close frame. Shutting down session.");
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            update = next_snapshot(&mut active) => match update {
                Some(next) => {
                    let mut sink = socket_tx.lock().await;
                    for msg in snapshot_changes(&last, &next) {
                        if let Err(e) = send_msg(&mut sink, msg).await {
                            warn!(error = %e, "Failed to push state to client");
                        }
                    }
                    last = next;
                }
                None => {
                    // The provider ended on its own; the sync session is gone with it.
                    active = None;
                    last = UiSnapshot::default();
                    let _ = send_msg(&mut *socket_tx.lock().await, ServerMessage::Stopped).await;
                    info!("Interview ended upstream");
                }
            },
        }
    }

    if let Some(session) = active.take() {
        session.shutdown().await;
    }
    info!("WebSocket connection closed and interview session terminated.");
}

/// Announces a new interview. Every `start` gets its own id, distinct from
/// the connection's.
fn started_message() -> ServerMessage {
    ServerMessage::Started {
        session_id: Uuid::new_v4(),
    }
}

/// Waits for the next UI snapshot of the active session.
///
/// Pends forever when no session is active. Returns `None` once the session's
/// snapshot sender is gone.
async fn next_snapshot(active: &mut Option<ActiveSession>) -> Option<UiSnapshot> {
    match active {
        Some(session) => match session.ui.changed().await {
            Ok(()) => Some(session.ui.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::{OutboundEvent, PresentationState, SessionHandle, SyncConfig};
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_next_snapshot_follows_the_sync_session() {
        let (ack_tx, _ack_rx) = mpsc::channel::<OutboundEvent>(4);
        let sync = SessionHandle::spawn(SyncConfig::default(), Arc::new(ack_tx));
        let mut ui = sync.subscribe();

        sync.send_event(json!({"type": "response.created"})).await.unwrap();
        ui.changed().await.unwrap();
        assert_eq!(ui.borrow_and_update().presentation, PresentationState::Talking);

        sync.stop().await.unwrap();
        // Teardown publishes one last snapshot, then the sender is dropped.
        let mut seen = Vec::new();
        while ui.changed().await.is_ok() {
            seen.push(ui.borrow_and_update().clone());
        }
        assert_eq!(seen.last(), Some(&UiSnapshot::default()));
    }

    #[test]
    fn test_each_start_gets_a_fresh_session_id() {
        let first = started_message();
        let second = started_message();
        assert_ne!(first, second);
        match first {
            ServerMessage::Started { session_id } => assert!(!session_id.is_nil()),
            other => panic!("Expected Started, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_next_snapshot_pends_without_a_session() {
        let mut active = None;
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            next_snapshot(&mut active),
        )
        .await;
        assert!(waited.is_err());
    }
}
