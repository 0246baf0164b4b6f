//! The `complete_interview` tool and the deferred completion hand-off.
//!
//! The agent is acknowledged the moment its call finalizes, but the user only
//! sees the completion once the agent has stopped talking.

use crate::event::OutboundEvent;
use crate::invocation::ToolInvocation;
use crate::presentation::PresentationState;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const COMPLETE_INTERVIEW: &str = "complete_interview";

pub const COMPLETE_INTERVIEW_DESCRIPTION: &str = "End the interview. Call this once every question has been covered, \
     when time is up, or when the candidate asks to stop. Finish speaking your closing remarks first.";

/// JSON schema of the `complete_interview` arguments, ready to advertise as tool parameters.
pub fn complete_interview_parameters() -> Value {
    let mut schema = schemars::schema_for!(CompleteInterviewArgs).to_value();
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
    }
    schema
}

/// Why the agent ended the interview.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    FinishedAllQuestions,
    TimeUp,
    UserRequested,
    Other,
}

/// Arguments the agent passes to `complete_interview`.
///
/// Only used to advertise the tool schema; received arguments are read
/// leniently through `CompletionRecord::from_arguments`.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct CompleteInterviewArgs {
    /// A short summary of how the interview went, shown to the candidate.
    pub summary: Option<String>,
    /// Why the interview is ending.
    pub reason: Option<CompletionReason>,
}

/// The result of a finalized `complete_interview` call.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRecord {
    pub summary: Option<String>,
    pub reason: Option<CompletionReason>,
}

impl CompletionRecord {
    /// Missing or wrongly typed fields, including an unknown reason, become `None`.
    pub fn from_arguments(arguments: &Map<String, Value>) -> Self {
        let summary = arguments
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string);
        let reason = arguments
            .get("reason")
            .filter(|v| v.is_string())
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Self { summary, reason }
    }
}

/// Holds a completion until presentation is idle, then makes it visible.
#[derive(Debug, Default)]
pub struct CompletionCoordinator {
    pending: Option<CompletionRecord>,
    finalized: Option<CompletionRecord>,
}

impl CompletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a `complete_interview` invocation and returns the acknowledgment
    /// that must be sent right away. A newer call replaces any earlier one.
    pub fn accept(&mut self, invocation: &ToolInvocation) -> OutboundEvent {
        let record = CompletionRecord::from_arguments(&invocation.arguments);
        info!(
            call_id = %invocation.call_id,
            reason = ?record.reason,
            replacing = self.pending.is_some() || self.finalized.is_some(),
            "Interview completion received, waiting for the agent to go idle"
        );
        self.pending = Some(record);
        OutboundEvent::acknowledge(invocation.call_id.clone())
    }

    /// Promotes the pending record if `state` is idle. Returns whether it did.
    pub fn observe(&mut self, state: PresentationState) -> bool {
        if state != PresentationState::Idle {
            return false;
        }
        match self.pending.take() {
            Some(record) => {
                debug!(?record, "Completion promoted to visible");
                self.finalized = Some(record);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Option<&CompletionRecord> {
        self.pending.as_ref()
    }

    /// The completion the UI may show, if any.
    pub fn finalized(&self) -> Option<&CompletionRecord> {
        self.finalized.as_ref()
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.finalized = None;
    }
}
