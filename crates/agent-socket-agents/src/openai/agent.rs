//! Tool-calling agent backed by the Chat Completions API.

use agent_socket_core::{
    Agent, AgentError, AgentEvent, AgentEventStream, ConversationItem, MemoryHandle,
    ToolCallChunk,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::{
    stream::{SseDecoder, SseEvent, ToolCallAccumulator, parse_chunk},
    types::{ApiError, ChatMessage, ChatRequest, OpenAIConfig, StreamOptions, ToolSpec},
};
use crate::tools::ToolRegistry;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful financial assistant.";

/// Default bound on model round trips per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

/// Streaming agent that alternates between the model and its tools until
/// the model answers without requesting a tool.
#[derive(Clone)]
pub struct OpenAIAgent {
    client: reqwest::Client,
    config: OpenAIConfig,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: usize,
}

impl OpenAIAgent {
    /// Create an agent with the default prompt and no tools.
    #[must_use]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tools: ToolRegistry::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn build_request(&self, history: &[ConversationItem]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(history.iter().map(ChatMessage::from));

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            tools: self
                .tools
                .definitions()
                .into_iter()
                .map(ToolSpec::from)
                .collect(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, AgentError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|api| api.error.message)
            .unwrap_or(body);
        Err(AgentError::Api(format!("{status}: {message}")))
    }

    fn run(
        self,
        memory: MemoryHandle,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + Send {
        async_stream::try_stream! {
            for iteration in 0..self.max_iterations {
                let request = self.build_request(&memory.history().await?);
                tracing::debug!(
                    session_id = %memory.session_id(),
                    iteration,
                    messages = request.messages.len(),
                    "Requesting completion"
                );

                let mut body = self.send(&request).await?.bytes_stream();
                let mut decoder = SseDecoder::default();
                let mut calls = ToolCallAccumulator::default();
                let mut content = String::new();

                'read: while let Some(bytes) = body.next().await {
                    let bytes = bytes.map_err(|e| AgentError::Request(e.to_string()))?;
                    for event in decoder.push(&bytes)? {
                        let data = match event {
                            SseEvent::Done => break 'read,
                            SseEvent::Data(data) => data,
                        };
                        let chunk = parse_chunk(&data)?;

                        if let Some(usage) = chunk.usage {
                            tracing::debug!(
                                input_tokens = usage.prompt_tokens,
                                output_tokens = usage.completion_tokens,
                                "Completion usage"
                            );
                            yield AgentEvent::Other { kind: "usage".to_string() };
                        }

                        for choice in chunk.choices {
                            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                                content.push_str(&text);
                                yield AgentEvent::text(text);
                            }
                            for delta in choice.delta.tool_calls.unwrap_or_default() {
                                calls.push(delta);
                            }
                        }
                    }
                }

                let tool_calls = calls.finish();
                memory
                    .append(ConversationItem::assistant_with_tools(content, tool_calls.clone()))
                    .await?;

                if tool_calls.is_empty() {
                    return;
                }

                yield AgentEvent::tool_calls(
                    tool_calls
                        .iter()
                        .map(|call| {
                            ToolCallChunk::new(&call.id, &call.name, call.arguments.clone())
                        })
                        .collect(),
                );

                for call in &tool_calls {
                    let output = self.tools.invoke(call).await;
                    memory
                        .append(ConversationItem::tool(&call.id, &call.name, &output))
                        .await?;
                    yield AgentEvent::tool_result(&call.id, &call.name, output);
                }
            }

            Err::<(), _>(AgentError::IterationLimit(self.max_iterations))?;
        }
    }
}

#[async_trait]
impl Agent for OpenAIAgent {
    async fn stream(
        &self,
        input: &str,
        memory: MemoryHandle,
    ) -> Result<AgentEventStream, AgentError> {
        memory.append(ConversationItem::user(input)).await?;
        Ok(self.clone().run(memory).boxed())
    }
}
