//! Raw inbound events and the outbound acknowledgment.
//!
//! Inbound events are kept as loose JSON because the channel mixes many
//! event families and any field may be absent or carry an unexpected type.
//! Accessors implement the lookup rules; nothing here mutates state.

use serde::Serialize;
use serde_json::Value;

/// Type tags that are terminal on their own (single-shot tool calls).
pub const CANONICAL_TERMINAL_TYPES: [&str; 2] = ["function_call", "tool_call"];

/// The fixed payload carried by every acknowledgment.
pub const ACKNOWLEDGED_OUTPUT: &str = "{\"acknowledged\": true}";

/// One event received from the Session Lifecycle Manager.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    kind: String,
    body: Value,
}

/// Turn-taking hint derived from an event's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkSignal {
    Start,
    End,
}

impl InboundEvent {
    /// Wraps a decoded JSON value. Returns `None` when there is no string `type`.
    pub fn from_value(body: Value) -> Option<Self> {
        let kind = body.get("type")?.as_str()?.to_string();
        Some(Self { kind, body })
    }

    /// Decodes raw text from the wire.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok().and_then(Self::from_value)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn is_tool_related(&self) -> bool {
        self.kind.contains("function_call") || self.kind.contains("tool_call")
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.ends_with(".completed")
            || self.kind.ends_with(".done")
            || self.kind.ends_with(".finished")
            || CANONICAL_TERMINAL_TYPES.contains(&self.kind.as_str())
    }

    /// `call_id`, then `id`, then `call.id`.
    pub fn call_id(&self) -> Option<&str> {
        self.str_field(&["call_id"])
            .or_else(|| self.str_field(&["id"]))
            .or_else(|| self.str_field(&["call", "id"]))
    }

    /// `name`, then `function.name`, then `tool.name`.
    pub fn tool_name(&self) -> Option<&str> {
        self.str_field(&["name"])
            .or_else(|| self.str_field(&["function", "name"]))
            .or_else(|| self.str_field(&["tool", "name"]))
    }

    pub fn delta(&self) -> Option<&str> {
        self.str_field(&["delta"])
    }

    /// The top-level `arguments` field when it is text.
    pub fn text_arguments(&self) -> Option<&str> {
        self.str_field(&["arguments"])
    }

    /// The top-level `arguments` field when it is anything but text or null.
    pub fn structured_arguments(&self) -> Option<&Value> {
        self.body
            .get("arguments")
            .filter(|v| !v.is_string() && !v.is_null())
    }

    pub fn talk_signal(&self) -> Option<TalkSignal> {
        let kind = self.kind.as_str();
        match kind {
            "response.created" | "output_audio_buffer.started" => Some(TalkSignal::Start),
            "response.done"
            | "response.completed"
            | "response.cancelled"
            | "response.canceled"
            | "response.failed"
            | "response.stopped"
            | "output_audio_buffer.stopped" => Some(TalkSignal::End),
            _ if kind.starts_with("response.") && kind.ends_with(".delta") => {
                Some(TalkSignal::Start)
            }
            _ => None,
        }
    }

    fn str_field(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(&self.body, |v, key| v.get(key))?
            .as_str()
            .filter(|s| !s.is_empty())
    }
}

/// Events this layer sends back through the Session Lifecycle Manager.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "tool.output")]
    ToolOutput { call_id: String, output: String },
}

impl OutboundEvent {
    pub fn acknowledge(call_id: impl Into<String>) -> Self {
        OutboundEvent::ToolOutput {
            call_id: call_id.into(),
            output: ACKNOWLEDGED_OUTPUT.to_string(),
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            OutboundEvent::ToolOutput { call_id, .. } => call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(v: Value) -> InboundEvent {
        InboundEvent::from_value(v).unwrap()
    }

    #[test]
    fn test_from_value_requires_string_type() {
        assert!(InboundEvent::from_value(json!({"call_id": "c1"})).is_none());
        assert!(InboundEvent::from_value(json!({"type": 7})).is_none());
        assert!(InboundEvent::parse("not json").is_none());
        assert_eq!(
            InboundEvent::parse(r#"{"type":"response.created"}"#)
                .unwrap()
                .kind(),
            "response.created"
        );
    }

    #[test]
    fn test_tool_related_classification() {
        assert!(event(json!({"type": "response.function_call_arguments.delta"})).is_tool_related());
        assert!(event(json!({"type": "tool_call"})).is_tool_related());
        assert!(event(json!({"type": "conversation.tool_call.started"})).is_tool_related());
        assert!(!event(json!({"type": "response.audio.delta"})).is_tool_related());
        assert!(!event(json!({"type": "tool.call"})).is_tool_related());
    }

    #[test]
    fn test_terminal_classification() {
        for kind in [
            "response.function_call_arguments.done",
            "tool_call.completed",
            "function_call.finished",
            "function_call",
            "tool_call",
        ] {
            assert!(event(json!({ "type": kind })).is_terminal(), "{kind}");
        }
        assert!(!event(json!({"type": "response.function_call_arguments.delta"})).is_terminal());
        assert!(!event(json!({"type": "function_call.done.partial"})).is_terminal());
    }

    #[test]
    fn test_call_id_fallback_chain() {
        let e = event(json!({"type": "t", "call_id": "a", "id": "b", "call": {"id": "c"}}));
        assert_eq!(e.call_id(), Some("a"));
        let e = event(json!({"type": "t", "id": "b", "call": {"id": "c"}}));
        assert_eq!(e.call_id(), Some("b"));
        let e = event(json!({"type": "t", "call": {"id": "c"}}));
        assert_eq!(e.call_id(), Some("c"));
        let e = event(json!({"type": "t", "call_id": 42}));
        assert_eq!(e.call_id(), None);
    }

    #[test]
    fn test_tool_name_fallback_chain() {
        let e = event(json!({"type": "t", "function": {"name": "f"}, "tool": {"name": "g"}}));
        assert_eq!(e.tool_name(), Some("f"));
        let e = event(json!({"type": "t", "tool": {"name": "g"}}));
        assert_eq!(e.tool_name(), Some("g"));
        let e = event(json!({"type": "t", "name": ""}));
        assert_eq!(e.tool_name(), None);
    }

    #[test]
    fn test_arguments_accessors() {
        let textual = event(json!({"type": "t", "arguments": "{\"a\":1}"}));
        assert_eq!(textual.text_arguments(), Some("{\"a\":1}"));
        assert!(textual.structured_arguments().is_none());

        let structured = event(json!({"type": "t", "arguments": {"a": 1}}));
        assert!(structured.text_arguments().is_none());
        assert_eq!(structured.structured_arguments(), Some(&json!({"a": 1})));

        let null = event(json!({"type": "t", "arguments": null}));
        assert!(null.structured_arguments().is_none());
    }

    #[test]
    fn test_talk_signals() {
        let start = [
            "response.created",
            "response.audio.delta",
            "response.audio_transcript.delta",
            "response.output_audio.delta",
            "output_audio_buffer.started",
        ];
        for kind in start {
            assert_eq!(event(json!({ "type": kind })).talk_signal(), Some(TalkSignal::Start), "{kind}");
        }
        let end = ["response.done", "response.cancelled", "output_audio_buffer.stopped"];
        for kind in end {
            assert_eq!(event(json!({ "type": kind })).talk_signal(), Some(TalkSignal::End), "{kind}");
        }
        for kind in ["response.audio.done", "input_audio_buffer.speech_started", "session.created"] {
            assert_eq!(event(json!({ "type": kind })).talk_signal(), None, "{kind}");
        }
    }

    #[test]
    fn test_acknowledgment_wire_shape() {
        let ack = OutboundEvent::acknowledge("c1");
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            json,
            json!({"type": "tool.output", "call_id": "c1", "output": "{\"acknowledged\": true}"})
        );
        assert_eq!(ack.call_id(), "c1");
    }
}
