//! Translation of one agent turn into protocol messages.

use std::{collections::HashMap, sync::Arc};

use agent_socket_core::{Agent, AgentError, AgentEvent, MemoryHandle, ServerMessage};
use futures::{StreamExt, stream::BoxStream};
use serde_json::Value;

/// Turn error.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Agent failed to start turn: {0}")]
    Start(#[source] AgentError),
    #[error("Agent stream failed: {0}")]
    Stream(#[source] AgentError),
}

/// Messages of one turn, ending early with an error if the agent fails.
pub type TurnStream = BoxStream<'static, Result<ServerMessage, TurnError>>;

/// Translation state for a single turn.
///
/// Holds the accumulated text and the tool-call id to name map. Both start
/// empty and are dropped with the turn.
#[derive(Debug, Default)]
pub struct Turn {
    accumulated: String,
    tool_names: HashMap<String, String>,
}

impl Turn {
    /// Create an empty turn.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Project one agent event onto the messages it produces.
    pub fn apply(&mut self, event: AgentEvent) -> Vec<ServerMessage> {
        match event {
            AgentEvent::Chunk(chunk) => {
                let mut out = Vec::with_capacity(chunk.tool_calls.len() + 1);

                for call in chunk.tool_calls {
                    let Some((id, name)) = call.identity() else {
                        continue;
                    };
                    let (id, name) = (id.to_owned(), name.to_owned());
                    self.tool_names.insert(id.clone(), name.clone());
                    out.push(ServerMessage::ToolCall {
                        tool_name: name,
                        tool_args: call.args,
                        tool_call_id: id,
                    });
                }

                if !chunk.content.is_empty() {
                    self.accumulated.push_str(&chunk.content);
                    out.push(ServerMessage::ContentDelta {
                        delta: chunk.content,
                        accumulated: self.accumulated.clone(),
                    });
                }

                out
            }
            AgentEvent::ToolResult(output) => {
                let tool_name = self
                    .tool_names
                    .get(&output.tool_call_id)
                    .cloned()
                    .unwrap_or(output.name);

                // Payloads that are not JSON pass through as a string.
                let result = match serde_json::from_str::<Value>(&output.content) {
                    Ok(value) => value,
                    Err(_) => Value::String(output.content),
                };

                vec![ServerMessage::ToolResult {
                    tool_call_id: output.tool_call_id,
                    tool_name,
                    result,
                }]
            }
            AgentEvent::Other { kind } => {
                tracing::trace!(kind = %kind, "Ignoring agent event");
                Vec::new()
            }
        }
    }

    /// Close the turn once the agent stream is exhausted.
    #[must_use]
    pub fn finish(self) -> Vec<ServerMessage> {
        let mut out = Vec::with_capacity(2);
        if !self.accumulated.is_empty() {
            out.push(ServerMessage::ContentComplete {
                content: self.accumulated,
            });
        }
        out.push(ServerMessage::end());
        out
    }
}

/// Run one user turn through the agent and translate its events.
///
/// The stream always starts with `start`. On success it ends with `end`;
/// on failure the last item is the error and no `end` is produced.
#[must_use]
pub fn translate_turn(agent: Arc<dyn Agent>, input: String, memory: MemoryHandle) -> TurnStream {
    async_stream::stream! {
        yield Ok::<_, TurnError>(ServerMessage::start());

        let mut events = match agent.stream(&input, memory).await {
            Ok(events) => events,
            Err(e) => {
                yield Err(TurnError::Start(e));
                return;
            }
        };

        let mut turn = Turn::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    for msg in turn.apply(event) {
                        yield Ok(msg);
                    }
                }
                Err(e) => {
                    yield Err(TurnError::Stream(e));
                    return;
                }
            }
        }

        for msg in turn.finish() {
            yield Ok(msg);
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use agent_socket_agents::{MockAgent, MockResponse, OfflineAgent};
    use agent_socket_core::{AgentEvent, MemoryBackend, ToolCallChunk, ToolOutput};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::storage::InMemoryBackend;

    async fn memory() -> MemoryHandle {
        InMemoryBackend::new().open(Uuid::new_v4()).await.unwrap()
    }

    async fn collect(agent: Arc<dyn Agent>, input: &str) -> Vec<Result<ServerMessage, TurnError>> {
        translate_turn(agent, input.to_string(), memory().await)
            .collect()
            .await
    }

    fn kinds(messages: &[ServerMessage]) -> Vec<&'static str> {
        messages.iter().map(ServerMessage::kind).collect()
    }

    #[test]
    fn test_deltas_accumulate_by_appending() {
        let mut turn = Turn::new();
        let mut out = Vec::new();
        for fragment in ["Hel", "lo", "", " world"] {
            out.extend(turn.apply(AgentEvent::text(fragment)));
        }
        out.extend(turn.finish());

        let deltas: Vec<_> = out
            .iter()
            .filter_map(|m| match m {
                ServerMessage::ContentDelta { delta, accumulated } => Some((delta, accumulated)),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].0, deltas[0].1);
        for pair in deltas.windows(2) {
            assert_eq!(*pair[1].1, format!("{}{}", pair[0].1, pair[1].0));
        }

        assert_eq!(
            out[out.len() - 2],
            ServerMessage::ContentComplete {
                content: "Hello world".into()
            }
        );
        assert!(out.last().unwrap().is_end());
    }

    #[test]
    fn test_tool_calls_without_identity_are_skipped() {
        let mut turn = Turn::new();
        let out = turn.apply(AgentEvent::tool_calls(vec![
            ToolCallChunk {
                id: None,
                name: Some("get_transactions".into()),
                args: json!({}),
            },
            ToolCallChunk::new("call_a", "get_transactions", json!({"limit": 2})),
            ToolCallChunk::new("call_b", "lookup", json!({})),
        ]));

        assert_eq!(
            out,
            vec![
                ServerMessage::ToolCall {
                    tool_name: "get_transactions".into(),
                    tool_args: json!({"limit": 2}),
                    tool_call_id: "call_a".into(),
                },
                ServerMessage::ToolCall {
                    tool_name: "lookup".into(),
                    tool_args: json!({}),
                    tool_call_id: "call_b".into(),
                },
            ]
        );
    }

    #[test]
    fn test_tool_result_resolves_name_from_call() {
        let mut turn = Turn::new();
        turn.apply(AgentEvent::tool_calls(vec![ToolCallChunk::new(
            "call_1",
            "get_transactions",
            json!({}),
        )]));

        let out = turn.apply(AgentEvent::ToolResult(ToolOutput {
            tool_call_id: "call_1".into(),
            name: "reported_name".into(),
            content: r#"{"data": []}"#.into(),
        }));
        assert_eq!(
            out,
            vec![ServerMessage::ToolResult {
                tool_call_id: "call_1".into(),
                tool_name: "get_transactions".into(),
                result: json!({"data": []}),
            }]
        );
    }

    #[test]
    fn test_unknown_tool_result_falls_back_to_event_name_and_raw_text() {
        let mut turn = Turn::new();
        let out = turn.apply(AgentEvent::tool_result("call_9", "weather", "sunny, 21C"));
        assert_eq!(
            out,
            vec![ServerMessage::ToolResult {
                tool_call_id: "call_9".into(),
                tool_name: "weather".into(),
                result: json!("sunny, 21C"),
            }]
        );
    }

    #[test]
    fn test_other_events_are_ignored() {
        let mut turn = Turn::new();
        assert!(turn.apply(AgentEvent::Other { kind: "usage".into() }).is_empty());
        assert_eq!(kinds(&turn.finish()), vec!["end"]);
    }

    #[tokio::test]
    async fn test_turn_is_bracketed_by_start_and_end() {
        let agent = Arc::new(MockAgent::new(vec![MockResponse::text("Hello there")]));
        let out: Vec<_> = collect(agent, "Say hello")
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            kinds(&out),
            vec!["start", "content_delta", "content_complete", "end"]
        );
    }

    #[tokio::test]
    async fn test_empty_stream_yields_start_and_end_only() {
        let agent = Arc::new(MockAgent::new(vec![MockResponse::Stream(vec![])]));
        let out: Vec<_> = collect(agent, "")
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(kinds(&out), vec!["start", "end"]);
    }

    #[tokio::test]
    async fn test_start_failure_ends_turn_without_end() {
        let agent = Arc::new(MockAgent::new(vec![MockResponse::Error("offline".into())]));
        let out = collect(agent, "hi").await;

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(ServerMessage::Start { .. })));
        assert!(matches!(out[1], Err(TurnError::Start(_))));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_stops_translation() {
        let agent = Arc::new(MockAgent::new(vec![MockResponse::FailAfter(
            vec![AgentEvent::text("partial")],
            "connection reset".into(),
        )]));
        let out = collect(agent, "hi").await;

        assert_eq!(out.len(), 3);
        assert!(matches!(out[1], Ok(ServerMessage::ContentDelta { .. })));
        assert!(matches!(out[2], Err(TurnError::Stream(_))));
    }

    #[tokio::test]
    async fn test_transactions_turn_orders_call_before_result() {
        let agent = Arc::new(OfflineAgent::new());
        let out: Vec<_> = collect(agent, "What are my recent transactions?")
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(matches!(out.first(), Some(ServerMessage::Start { .. })));
        assert!(out.last().unwrap().is_end());

        let call_at = out
            .iter()
            .position(|m| {
                matches!(
                    m,
                    ServerMessage::ToolCall { tool_name, .. } if tool_name == "get_transactions"
                )
            })
            .expect("tool_call missing");
        let (result_at, result) = out
            .iter()
            .enumerate()
            .find_map(|(i, m)| match m {
                ServerMessage::ToolResult { result, .. } => Some((i, result)),
                _ => None,
            })
            .expect("tool_result missing");
        assert!(call_at < result_at);

        let data = result["data"].as_array().unwrap();
        assert!(!data.is_empty());
        for txn in data {
            for field in ["id", "amount", "date_time"] {
                assert!(txn.get(field).is_some(), "{field} missing in {txn}");
            }
        }
    }
}
