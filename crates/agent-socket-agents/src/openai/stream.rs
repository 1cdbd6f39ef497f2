//! Server-sent event decoding for streamed completions.

use std::collections::BTreeMap;

use agent_socket_core::{AgentError, ToolCall};
use serde_json::Value;

use super::types::{ApiError, StreamChunk, ToolCallDelta};

/// Decoded SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental SSE line decoder.
///
/// Buffers raw bytes so lines (and UTF-8 sequences) split across network
/// chunks are decoded only once complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes and return every complete `data:` payload.
    ///
    /// # Errors
    /// Returns error if a complete line is not valid UTF-8.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, AgentError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&raw)
                .map_err(|e| AgentError::InvalidResponse(format!("Invalid UTF-8: {e}")))?
                .trim_end_matches(['\r', '\n']);

            // Comments and other fields are keep-alives for our purposes.
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }
        Ok(events)
    }
}

/// Parse one `data:` payload.
///
/// # Errors
/// Returns the API error if the payload is an error body, or an invalid
/// response error if it is neither a chunk nor an error.
pub fn parse_chunk(data: &str) -> Result<StreamChunk, AgentError> {
    // Every chunk field is optional, so error bodies must be checked first.
    if let Ok(api) = serde_json::from_str::<ApiError>(data) {
        return Err(AgentError::Api(api.error.message));
    }
    serde_json::from_str(data).map_err(|e| AgentError::InvalidResponse(format!("{e}: {data}")))
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Assembles streamed tool-call fragments by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    /// Merge one fragment.
    pub fn push(&mut self, delta: ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name = name;
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Completed calls in index order. Calls missing an id or a name are
    /// dropped; unparseable arguments become an empty object.
    #[must_use]
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter(|call| !call.id.is_empty() && !call.name.is_empty())
            .map(|call| {
                let arguments = match serde_json::from_str::<Value>(&call.arguments) {
                    Ok(value @ Value::Object(_)) => value,
                    _ => Value::Object(serde_json::Map::new()),
                };
                ToolCall::new(call.id, call.name, arguments)
            })
            .collect()
    }
}
