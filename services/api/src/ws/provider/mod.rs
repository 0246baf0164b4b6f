//! Manages the realtime agent connection and the sync session that watches it.

pub mod openai;

use super::{protocol::ServerMessage, session::send_msg};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use interview_core::{OutboundEvent, SessionHandle, UiSnapshot};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// An internal event passed to the active realtime provider task.
#[derive(Debug)]
pub enum RealtimeClientEvent {
    /// A chunk of PCM16 LE microphone audio from the client.
    Audio(Bytes),
}

/// A running interview: the upstream connection plus its sync session.
pub struct ActiveSession {
    pub tx: mpsc::Sender<RealtimeClientEvent>,
    pub ui: watch::Receiver<UiSnapshot>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    /// Closes the client side and waits briefly for the provider to tear down.
    pub async fn shutdown(self) {
        let Self { tx, mut task, .. } = self;
        drop(tx);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Realtime provider did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Starts the sync session and the realtime provider task that feeds it.
///
/// Acknowledgments produced by the sync session flow back to the provider,
/// which relays them upstream as function call outputs.
pub fn start_realtime_provider(
    state: Arc<AppState>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
) -> ActiveSession {
    let (tx, rx) = mpsc::channel(128);
    let (ack_tx, ack_rx) = mpsc::channel::<OutboundEvent>(16);
    let sync = SessionHandle::spawn(state.config.sync, Arc::new(ack_tx));
    let ui = sync.subscribe();

    let task = tokio::spawn(async move {
        let result = openai::run(&state, rx, ack_rx, &sync, socket_tx.clone()).await;
        if let Err(e) = sync.stop().await {
            error!(error = %e, "Sync session did not shut down cleanly");
        }
        match result {
            Ok(()) => info!("Realtime provider finished"),
            Err(e) => {
                error!(error = ?e, "Realtime provider task failed");
                let mut sink = socket_tx.lock().await;
                let _ = send_msg(
                    &mut sink,
                    ServerMessage::Error {
                        message: format!("Voice connection failed: {}", e),
                    },
                )
                .await;
            }
        }
    });

    ActiveSession { tx, ui, task }
}
