//! The per-session task.
//!
//! Everything that touches a `SyncSession` happens inside `run_session`, one
//! `select!` arm at a time, so the state needs no locks. Inbound events are
//! handled in arrival order; frame ticks and watchdog expiry interleave with
//! them in whatever order the scheduler picks.

use crate::error::{SessionError, SinkError};
use crate::event::{InboundEvent, OutboundEvent};
use crate::session::{SyncConfig, SyncSession, UiSnapshot};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug, error, info};

/// The outbound send primitive of the Session Lifecycle Manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: OutboundEvent) -> Result<(), SinkError>;
}

#[async_trait]
impl EventSink for mpsc::Sender<OutboundEvent> {
    async fn send(&self, event: OutboundEvent) -> Result<(), SinkError> {
        mpsc::Sender::send(self, event).await.map_err(|_| SinkError)
    }
}

/// Everything the lifecycle manager can push into a running session.
#[derive(Debug)]
pub enum SessionInput {
    /// A raw event off the channel.
    Event(Value),
    /// Decoded remote audio, mono f32 at the configured sample rate.
    Audio(Vec<f32>),
    Stop,
}

/// Owner-side handle to a running session task.
///
/// Dropping the handle stops the session just like `stop`, without waiting.
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
    ui: watch::Receiver<UiSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawns the session task in the current tracing span.
    pub fn spawn(config: SyncConfig, sink: Arc<dyn EventSink>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (ui_tx, ui) = watch::channel(UiSnapshot::default());
        let task = tokio::spawn(run_session(config, rx, sink, ui_tx).in_current_span());
        Self { tx, ui, task }
    }

    pub async fn send_event(&self, event: Value) -> Result<(), SessionError> {
        self.push(SessionInput::Event(event)).await
    }

    pub async fn push_audio(&self, samples: Vec<f32>) -> Result<(), SessionError> {
        self.push(SessionInput::Audio(samples)).await
    }

    /// A receiver that always holds the latest UI snapshot.
    pub fn subscribe(&self) -> watch::Receiver<UiSnapshot> {
        self.ui.clone()
    }

    /// Asks the task to tear down and waits for it to finish.
    pub async fn stop(self) -> Result<(), SessionError> {
        // The task may already be gone; joining still reports how it ended.
        let _ = self.tx.send(SessionInput::Stop).await;
        self.task.await?;
        Ok(())
    }

    async fn push(&self, input: SessionInput) -> Result<(), SessionError> {
        self.tx.send(input).await.map_err(|_| SessionError::Stopped)
    }
}

/// Runs one session until a `Stop` arrives or every input sender is dropped.
pub async fn run_session(
    config: SyncConfig,
    mut inputs: mpsc::Receiver<SessionInput>,
    sink: Arc<dyn EventSink>,
    ui: watch::Sender<UiSnapshot>,
) {
    let mut session = SyncSession::new(config);
    let mut frames = time::interval(config.frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(frame_interval = ?config.frame_interval, arbitration = ?config.presentation.arbitration, "Sync session started");

    loop {
        let watchdog = session.watchdog_deadline();
        tokio::select! {
            input = inputs.recv() => match input {
                Some(SessionInput::Event(raw)) => {
                    let Some(event) = InboundEvent::from_value(raw) else {
                        debug!("Ignoring inbound event without a type");
                        continue;
                    };
                    session.handle_event(&event, Instant::now());
                    flush_outbox(&mut session, sink.as_ref()).await;
                }
                Some(SessionInput::Audio(samples)) => session.push_audio(&samples),
                Some(SessionInput::Stop) | None => break,
            },
            _ = time::sleep_until(watchdog.unwrap_or_else(Instant::now)), if watchdog.is_some() => {
                session.fire_watchdog(Instant::now());
            }
            now = frames.tick() => session.tick(now),
        }
        publish(&session, &ui);
    }

    session.teardown();
    publish(&session, &ui);
    info!("Sync session stopped");
}

async fn flush_outbox(session: &mut SyncSession, sink: &dyn EventSink) {
    for event in session.drain_outbox() {
        let call_id = event.call_id().to_string();
        match sink.send(event).await {
            Ok(()) => debug!(%call_id, "Tool call acknowledged"),
            Err(e) => error!(%call_id, error = %e, "Failed to send tool acknowledgment"),
        }
    }
}

fn publish(session: &SyncSession, ui: &watch::Sender<UiSnapshot>) {
    let next = session.snapshot();
    ui.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
