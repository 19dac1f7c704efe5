//! Conversation message types.
//!
//! These are the value objects exchanged with the language model during one
//! post analysis: the opening user message, assistant turns that may carry
//! tool calls, and tool-result turns answering them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The operator side of the conversation
    User,
    /// The language model
    Assistant,
    /// System instructions
    System,
    /// Tool execution results
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Tool results carried by a tool turn, in the order the calls were issued
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultContent>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool turn answering every call of the preceding assistant turn.
    pub fn tool_results(results: Vec<ToolResultContent>) -> Self {
        let mut msg = Self::with_role(Role::Tool, String::new());
        msg.tool_results = results;
        msg
    }

    /// Attach tool calls to an assistant message.
    pub fn with_tool_calls(mut self, calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON-encoded string
    pub arguments: String,
}

/// One block of tool-result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64-encoded image bytes
    Image { media_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// The result of one tool call, as sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    /// The tool call this answers
    pub tool_call_id: String,

    /// Ordered content blocks
    pub parts: Vec<ContentPart>,

    /// Whether the call failed and should be corrected by the model
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultContent {
    /// Concatenated text of all text parts, with image parts as placeholders.
    pub fn summary(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Image { media_type, .. } => format!("[IMAGE: {media_type}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Analyze this RSS post");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Analyze this RSS post");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.tool_results.is_empty());
    }

    #[test]
    fn tool_results_message_keeps_order() {
        let msg = Message::tool_results(vec![
            ToolResultContent {
                tool_call_id: "a".into(),
                parts: vec![ContentPart::text("first")],
                is_error: false,
            },
            ToolResultContent {
                tool_call_id: "b".into(),
                parts: vec![ContentPart::text("second")],
                is_error: true,
            },
        ]);
        assert_eq!(msg.role, Role::Tool);
        let ids: Vec<_> = msg.tool_results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn summary_replaces_images_with_placeholders() {
        let result = ToolResultContent {
            tool_call_id: "t1".into(),
            parts: vec![
                ContentPart::text("Loaded 1 image(s)."),
                ContentPart::image("image/png", "aGVsbG8="),
            ],
            is_error: false,
        };
        assert_eq!(result.summary(), "Loaded 1 image(s).\n[IMAGE: image/png]");
    }

    #[test]
    fn content_part_serializes_with_type_tag() {
        let json = serde_json::to_value(ContentPart::image("image/gif", "R0lG")).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["media_type"], "image/gif");
    }
}
