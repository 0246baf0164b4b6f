//! Reassembly of streamed tool calls into complete invocations.
//!
//! `ToolCallAssembler` is the Call Buffer Store plus the Tool Invocation
//! Parser: it classifies each inbound event, accumulates fragments, and on a
//! terminal marker turns the buffer into a `ToolInvocation`.

use crate::call_buffer::CallBufferStore;
use crate::error::ArgumentsError;
use crate::event::InboundEvent;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

/// A fully reconstructed, named tool request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub call_id: String,
    pub arguments: Map<String, Value>,
}

/// How the argument text turned into a record.
#[derive(Debug)]
pub enum ArgumentsOutcome {
    Parsed(Map<String, Value>),
    /// There was no text at all.
    Empty,
    /// The text was unusable; an empty record stands in.
    Recovered(ArgumentsError),
}

impl ArgumentsOutcome {
    pub fn into_record(self) -> Map<String, Value> {
        match self {
            ArgumentsOutcome::Parsed(map) => map,
            ArgumentsOutcome::Empty | ArgumentsOutcome::Recovered(_) => Map::new(),
        }
    }
}

/// Decodes argument text into a structured record.
pub fn parse_arguments(raw: &str) -> ArgumentsOutcome {
    if raw.trim().is_empty() {
        return ArgumentsOutcome::Empty;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => ArgumentsOutcome::Parsed(map),
        Ok(other) => ArgumentsOutcome::Recovered(ArgumentsError::NotARecord(json_kind(&other))),
        Err(e) => ArgumentsOutcome::Recovered(ArgumentsError::Malformed(e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Why a tool-shaped event was dropped without touching any buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingCallId,
    MissingName,
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Not a tool event.
    Ignored,
    Dropped(DropReason),
    /// A fragment was appended, or the event carried nothing to append.
    Pending,
    Finalized(ToolInvocation),
}

#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    store: CallBufferStore,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &CallBufferStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CallBufferStore {
        &mut self.store
    }

    pub fn ingest(&mut self, event: &InboundEvent, now: Instant) -> Ingest {
        if !event.is_tool_related() {
            return Ingest::Ignored;
        }

        let Some(call_id) = event.call_id() else {
            debug!(kind = %event.kind(), "Dropping tool event without a call id");
            return Ingest::Dropped(DropReason::MissingCallId);
        };
        let Some(name) = event
            .tool_name()
            .or_else(|| self.store.remembered_name(call_id))
            .map(str::to_string)
        else {
            debug!(kind = %event.kind(), %call_id, "Dropping tool event without a tool name");
            return Ingest::Dropped(DropReason::MissingName);
        };

        let terminal = event.is_terminal();

        // A textual `arguments` on a terminal event is the whole payload, not a fragment.
        let fragment = match (event.delta(), event.text_arguments()) {
            (Some(delta), _) => Some(delta),
            (None, Some(args)) if !terminal => Some(args),
            _ => None,
        };
        if let Some(fragment) = fragment {
            self.store.append(call_id, &name, fragment, now);
        }

        if !terminal {
            return Ingest::Pending;
        }

        let buffered = self.store.take(call_id).map(|b| b.raw).unwrap_or_default();
        let raw = if !buffered.is_empty() {
            buffered
        } else if let Some(text) = event.text_arguments() {
            text.to_string()
        } else if let Some(structured) = event.structured_arguments() {
            structured.to_string()
        } else {
            String::new()
        };

        let arguments = match parse_arguments(&raw) {
            ArgumentsOutcome::Recovered(err) => {
                warn!(%call_id, tool = %name, error = %err, "Tool arguments unusable, using an empty record");
                Map::new()
            }
            outcome => outcome.into_record(),
        };

        debug!(%call_id, tool = %name, "Tool invocation finalized");
        Ingest::Finalized(ToolInvocation {
            name,
            call_id: call_id.to_string(),
            arguments,
        })
    }

    /// Discards all partial buffers, returning how many were dropped.
    pub fn reset(&mut self) -> usize {
        self.store.clear()
    }
}
