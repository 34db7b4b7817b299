//! Message domain types.
//!
//! These are the core value objects that flow through the engine:
//! the caller's input becomes a user message, the provider answers with an
//! assistant message (possibly carrying tool calls), and tool observations
//! flow back as further context for the next turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (framing, rules)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
///
/// `content` is always serialized, even when empty — several provider APIs
/// reject a null content field, so an absent body must encode as `""`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional sender/tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Multimodal content parts; when non-empty, the textual content is
    /// derived from the `Text` parts and `content` is a fallback
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// The effective text of this message.
    ///
    /// When multimodal parts are present, the text parts are concatenated;
    /// otherwise the plain `content` field is authoritative.
    pub fn text(&self) -> String {
        if self.parts.is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A piece of multimodal message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },

    /// An image referenced by URL
    ImageUrl {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// An image carried inline as binary data
    ImageData { mime_type: String, data: Vec<u8> },
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (assigned by the model)
    pub id: String,

    /// Call type; providers currently emit `"function"`
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,

    /// The function to invoke
    pub function: ToolFunction,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: ToolFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// The function half of a tool call: a name plus parsed arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,

    /// Arguments as a structured map. Providers that receive arguments as a
    /// JSON string must parse them once at the boundary (`parse_arguments`).
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

impl ToolFunction {
    /// Parse a raw JSON argument string into the structured map form.
    ///
    /// Malformed or non-object payloads yield an empty map rather than an
    /// error: a garbled argument string from the model should surface as a
    /// tool-level failure, not abort the turn.
    pub fn parse_arguments(raw: &str) -> serde_json::Map<String, Value> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn empty_content_serializes_as_empty_string() {
        let msg = Message::assistant("");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""content":"""#), "got: {json}");
        assert!(!json.contains("null"));
    }

    #[test]
    fn tool_call_type_field_renames() {
        let call = ToolCall::new("call_1", "add", serde_json::Map::new());
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains(r#""type":"function""#));
    }

    #[test]
    fn text_prefers_parts_when_present() {
        let mut msg = Message::assistant("fallback");
        msg.parts = vec![
            ContentPart::Text {
                text: "Hello ".into(),
            },
            ContentPart::ImageUrl {
                url: "https://example.com/cat.png".into(),
                detail: None,
            },
            ContentPart::Text {
                text: "world".into(),
            },
        ];
        assert_eq!(msg.text(), "Hello world");

        msg.parts.clear();
        assert_eq!(msg.text(), "fallback");
    }

    #[test]
    fn parse_arguments_tolerates_garbage() {
        let args = ToolFunction::parse_arguments(r#"{"a": 2, "b": 3}"#);
        assert_eq!(args.get("a"), Some(&json!(2)));

        assert!(ToolFunction::parse_arguments("not json").is_empty());
        assert!(ToolFunction::parse_arguments("[1, 2]").is_empty());
    }

    #[test]
    fn message_serialization_roundtrip() {
        let mut msg = Message::assistant("Using a tool");
        msg.tool_calls = vec![ToolCall::new(
            "call_1",
            "search",
            ToolFunction::parse_arguments(r#"{"query": "rust"}"#),
        )];
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].function.name, "search");
    }
}
