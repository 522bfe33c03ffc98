//! Request, message and response types shared by every backend.
//!
//! Field names follow the Anthropic Messages API so a request serializes
//! straight onto the wire; the agent loop keeps its conversation in these
//! same types between turns.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// One call to the model: the conversation so far plus what the model may do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,

    /// Alternating user and assistant turns, oldest first.
    pub messages: Vec<Message>,

    /// Output budget for this call.
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Set by the backend to match the call it makes.
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            system: None,
            tools: Vec::new(),
            stream: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    /// A plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Replays a model turn, tool calls included, back into the conversation.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Blocks(blocks),
        }
    }

    /// The user turn that answers a model turn's tool calls.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(results),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A bare string on the wire, or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    pub fn as_blocks(&self) -> Option<&[ContentBlock]> {
        match self {
            Content::Blocks(blocks) => Some(blocks),
            Content::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// The model asking for a tool to run. `id` is unique within the turn.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// A tool's output, serialized as a JSON string.
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }
}

/// An owned copy of one tool call, detached from its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A tool the model may call, described by a JSON Schema for its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// A complete model turn, whether it arrived in one body or was assembled
/// from stream events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,

    /// The model that actually answered, which may be a dated alias.
    pub model: String,

    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            content,
            model: model.into(),
            stop_reason: Some(stop_reason),
            usage,
        }
    }

    /// Tool calls in the order the model emitted them.
    pub fn tool_uses(&self) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        for block in &self.content {
            if let ContentBlock::ToolUse { id, name, input } = block {
                calls.push(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
            }
        }
        calls
    }

    /// All text blocks concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Unknown or missing reasons count as a normal end of turn.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token counts as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_text_serializes_as_string() {
        let value = serde_json::to_value(Message::user("Hello")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "Hello"}));

        let msg = Message::assistant_blocks(vec![ContentBlock::text("Hi")]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.as_blocks().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = CompletionRequest::new("claude-sonnet-4-20250514", vec![Message::user("Hi")], 4096)
            .with_system("You answer with SQL")
            .with_tools(vec![ToolDefinition::new(
                "get_schema",
                "Get schema",
                json!({"type": "object", "properties": {}}),
            )])
            .with_streaming();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "You answer with SQL");
        assert_eq!(value["stream"], true);
        assert_eq!(value["tools"][0]["name"], "get_schema");
        assert_eq!(value["messages"][0]["content"], "Hi");

        let bare = serde_json::to_value(CompletionRequest::new("m", vec![], 10)).unwrap();
        assert!(bare.get("system").is_none());
        assert!(bare.get("tools").is_none());
    }

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::tool_use("t1", "get_schema", json!({"tables": []}));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["id"], "t1");

        let block = ContentBlock::tool_result("t1", "{\"tables\":[]}");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "t1");
    }

    #[test]
    fn test_response_accessors() {
        let response = CompletionResponse::new(
            "msg_1",
            "model",
            vec![
                ContentBlock::text("Let me look. "),
                ContentBlock::tool_use("t1", "get_schema", json!({})),
                ContentBlock::text("Done."),
            ],
            StopReason::ToolUse,
            Usage::new(10, 5),
        );

        assert!(response.has_tool_use());
        assert_eq!(response.text(), "Let me look. Done.");
        let calls = response.tool_uses();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
    }

    #[test]
    fn test_stop_reason_from_wire() {
        assert_eq!(StopReason::from_wire(Some("tool_use")), StopReason::ToolUse);
        assert_eq!(StopReason::from_wire(Some("bogus")), StopReason::EndTurn);
        assert_eq!(StopReason::from_wire(None), StopReason::EndTurn);
    }
}
