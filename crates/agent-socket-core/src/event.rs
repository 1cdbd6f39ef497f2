//! Raw events produced by an agent while it works on one turn.
//!
//! The set is closed on purpose: anything an upstream agent emits that does
//! not map onto a chunk or a tool result lands in [`AgentEvent::Other`] and is
//! ignored downstream.

use serde_json::Value;

/// A tool invocation announced inside an assistant chunk.
///
/// Upstream agents may announce partial calls (no id yet, or no name);
/// only calls carrying both are forwarded to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallChunk {
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: Value,
}

impl ToolCallChunk {
    /// Create a fully identified tool call announcement.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            args,
        }
    }

    /// Id and name, if both are present and non-empty.
    #[must_use]
    pub fn identity(&self) -> Option<(&str, &str)> {
        match (self.id.as_deref(), self.name.as_deref()) {
            (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => Some((id, name)),
            _ => None,
        }
    }
}

/// A chunk of assistant output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageChunk {
    /// Text fragment; empty when the chunk only carries tool calls.
    pub content: String,
    /// Tool calls announced by this chunk, in source order.
    pub tool_calls: Vec<ToolCallChunk>,
}

/// Result of a completed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    /// Name reported by the tool runner.
    pub name: String,
    /// Raw payload, usually JSON text.
    pub content: String,
}

/// One event in an agent's arrival-ordered output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Chunk(MessageChunk),
    ToolResult(ToolOutput),
    /// Any other upstream shape (usage reports, metadata).
    Other { kind: String },
}

impl AgentEvent {
    /// A text-only chunk.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Chunk(MessageChunk {
            content: content.into(),
            tool_calls: Vec::new(),
        })
    }

    /// A chunk announcing tool calls without text.
    #[must_use]
    pub fn tool_calls(tool_calls: Vec<ToolCallChunk>) -> Self {
        Self::Chunk(MessageChunk {
            content: String::new(),
            tool_calls,
        })
    }

    /// A tool result.
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ToolResult(ToolOutput {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_requires_id_and_name() {
        assert!(ToolCallChunk::new("call_1", "get_transactions", json!({})).identity().is_some());

        let missing_id = ToolCallChunk {
            id: None,
            name: Some("get_transactions".into()),
            args: json!({}),
        };
        assert!(missing_id.identity().is_none());

        let empty_name = ToolCallChunk::new("call_1", "", json!({}));
        assert!(empty_name.identity().is_none());
    }
}
