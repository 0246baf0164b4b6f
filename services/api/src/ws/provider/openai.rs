//! Handles the realtime WebSocket connection to OpenAI for the interview agent.

use super::RealtimeClientEvent;
use crate::{
    audio_utils,
    state::AppState,
    ws::{protocol::ServerMessage, session::send_msg},
};
use anyhow::{Context, Result};
use async_openai::types::realtime::{
    self as oai_realtime, ClientEvent as OAIClientEvent, ServerEvent as OAIServerEvent,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use interview_core::{
    OutboundEvent, SessionHandle,
    completion::{COMPLETE_INTERVIEW, COMPLETE_INTERVIEW_DESCRIPTION, complete_interview_parameters},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type ClientSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Runs the main loop for the OpenAI Realtime API connection.
///
/// Every upstream event is handed to the sync session. Audio deltas are also
/// decoded for the playback tap and forwarded to the browser. Returns when
/// the client side closes or OpenAI hangs up.
pub async fn run(
    state: &Arc<AppState>,
    mut rx: mpsc::Receiver<RealtimeClientEvent>,
    mut acks: mpsc::Receiver<OutboundEvent>,
    sync: &SessionHandle,
    socket_tx: ClientSink,
) -> Result<()> {
    let url = format!(
        "wss://api.openai.com/v1/realtime?model={}",
        state.config.realtime_model
    );

    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", state.config.openai_api_key).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    let (mut openai_tx, mut openai_rx) = ws_stream.split();
    info!(model = %state.config.realtime_model, "Connected to OpenAI Realtime API.");

    let session_config = oai_realtime::SessionResource {
        model: Some(state.config.realtime_model.clone()),
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(state.instructions.as_ref().clone()),
        voice: Some(oai_realtime::RealtimeVoice::Alloy),
        input_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        output_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        input_audio_transcription: Some(oai_realtime::AudioTranscription {
            model: Some("whisper-1".to_string()),
            ..Default::default()
        }),
        turn_detection: Some(oai_realtime::TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 200,
            silence_duration_ms: 700,
            interrupt_response: Some(true),
            create_response: Some(true),
        }),
        tools: Some(vec![oai_realtime::ToolDefinition::Function {
            name: COMPLETE_INTERVIEW.to_string(),
            description: COMPLETE_INTERVIEW_DESCRIPTION.to_string(),
            parameters: complete_interview_parameters(),
        }]),
        ..Default::default()
    };
    let event = OAIClientEvent::SessionUpdate(oai_realtime::SessionUpdateEvent {
        session: session_config,
        event_id: None,
    });
    openai_tx
        .send(WsMessage::Text(serde_json::to_string(&event)?.into()))
        .await?;

    loop {
        tokio::select! {
            biased;
            // Acknowledgments go out before anything else is read.
            Some(ack) = acks.recv() => {
                let OutboundEvent::ToolOutput { call_id, output } = ack;
                let item = oai_realtime::Item {
                    r#type: Some(oai_realtime::ItemType::FunctionCallOutput),
                    call_id: Some(call_id.clone()),
                    output: Some(output),
                    id: None, status: None, role: None, content: None, name: None, arguments: None,
                };
                let create_event = oai_realtime::ConversationItemCreateEvent { item, event_id: None, previous_item_id: None };
                openai_tx.send(WsMessage::Text(serde_json::to_string(&OAIClientEvent::ConversationItemCreate(create_event))?.into())).await?;
                debug!(%call_id, "Function call output sent upstream");
            },
            event = rx.recv() => match event {
                Some(RealtimeClientEvent::Audio(data)) => {
                    let append_event = oai_realtime::InputAudioBufferAppendEvent { audio: audio_utils::encode_pcm16_bytes(&data), event_id: None };
                    openai_tx.send(WsMessage::Text(serde_json::to_string(&OAIClientEvent::InputAudioBufferAppend(append_event))?.into())).await?;
                }
                None => {
                    info!("Client side closed, ending realtime session");
                    break;
                }
            },
            msg = openai_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => forward_upstream(&text, sync, &socket_tx).await?,
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "OpenAI closed the realtime connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("OpenAI Realtime WebSocket error"),
                None => break,
            },
        }
    }

    let _ = openai_tx.close().await;
    Ok(())
}

/// Relays one upstream text frame to the sync session and, where the browser
/// cares about it, to the client.
async fn forward_upstream(text: &str, sync: &SessionHandle, socket_tx: &ClientSink) -> Result<()> {
    let raw: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Dropping non-JSON upstream frame");
            return Ok(());
        }
    };

    if let Ok(server_event) = serde_json::from_value::<OAIServerEvent>(raw.clone()) {
        match server_event {
            OAIServerEvent::ResponseAudioDelta(e) => {
                sync.push_audio(audio_utils::decode_f32_from_base64_i16(&e.delta))
                    .await?;
                send_msg(&mut *socket_tx.lock().await, ServerMessage::AudioChunk { data: e.delta }).await?;
            }
            OAIServerEvent::ConversationItemInputAudioTranscriptionDelta(e) => {
                send_msg(&mut *socket_tx.lock().await, ServerMessage::TranscriptionUpdate { text: e.delta, is_final: false }).await?
            }
            OAIServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
                send_msg(&mut *socket_tx.lock().await, ServerMessage::TranscriptionUpdate { text: e.transcript, is_final: true }).await?
            }
            OAIServerEvent::Error(e) => {
                warn!(message = %e.error.message, "OpenAI reported an error");
                send_msg(&mut *socket_tx.lock().await, ServerMessage::Error { message: e.error.message }).await?
            }
            _ => {}
        }
    }

    sync.send_event(raw).await?;
    Ok(())
}
