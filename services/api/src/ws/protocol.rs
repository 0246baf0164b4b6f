//! Defines the WebSocket message protocol between the browser client and the API server.

use interview_core::{CompletionReason, PresentationState, UiSnapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
///
/// Microphone audio travels separately as binary frames of PCM16 LE.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the upstream agent connection and starts the interview.
    Start,
    /// Ends the interview and tears the session down.
    Stop,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The interview session is live.
    Started { session_id: Uuid },
    /// Whether the agent is currently speaking.
    Presentation { state: PresentationState },
    /// The agent has finished the interview and stopped talking.
    InterviewComplete {
        summary: Option<String>,
        reason: Option<CompletionReason>,
    },
    /// A chunk of audio data (base64 encoded PCM16) for the agent's voice.
    AudioChunk { data: String },
    /// An update on the user's speech-to-text transcription.
    TranscriptionUpdate { text: String, is_final: bool },
    /// Reports an error to the client.
    Error { message: String },
    /// The session has been torn down.
    Stopped,
}

/// Messages needed to bring a client from `prev` to `next`.
pub fn snapshot_changes(prev: &UiSnapshot, next: &UiSnapshot) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    if prev.presentation != next.presentation {
        out.push(ServerMessage::Presentation {
            state: next.presentation,
        });
    }
    if prev.completion != next.completion {
        if let Some(record) = &next.completion {
            out.push(ServerMessage::InterviewComplete {
                summary: record.summary.clone(),
                reason: record.reason,
            });
        }
    }
    out
}
