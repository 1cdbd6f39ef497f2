//! Scripted agent for tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use agent_socket_core::{Agent, AgentError, AgentEvent, AgentEventStream, MemoryHandle};
use async_trait::async_trait;
use futures::{StreamExt, stream};

/// One scripted turn.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit these events, then finish.
    Stream(Vec<AgentEvent>),
    /// Refuse to start the turn.
    Error(String),
    /// Emit these events, then fail mid-stream.
    FailAfter(Vec<AgentEvent>, String),
    /// Wait before playing the inner response.
    Delay(Duration, Box<Self>),
}

impl MockResponse {
    /// A single text chunk.
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::Stream(vec![AgentEvent::text(content)])
    }

    /// Play `self` after `delay`.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delay(delay, Box::new(self))
    }

    fn into_stream(self) -> Result<AgentEventStream, AgentError> {
        match self {
            Self::Stream(events) => Ok(stream::iter(events.into_iter().map(Ok)).boxed()),
            Self::Error(msg) => Err(AgentError::Request(msg)),
            Self::FailAfter(events, msg) => Ok(stream::iter(events.into_iter().map(Ok))
                .chain(stream::once(async move { Err(AgentError::Request(msg)) }))
                .boxed()),
            Self::Delay(delay, inner) => Ok(async_stream::stream! {
                tokio::time::sleep(delay).await;
                match inner.into_stream() {
                    Ok(mut events) => {
                        while let Some(event) = events.next().await {
                            yield event;
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
            .boxed()),
        }
    }
}

/// Agent that replays scripted responses in order.
#[derive(Debug, Default)]
pub struct MockAgent {
    responses: Mutex<VecDeque<MockResponse>>,
    inputs: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockAgent {
    #[must_use]
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            inputs: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of turns requested so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs received so far, in order.
    #[must_use]
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn stream(
        &self,
        input: &str,
        _memory: MemoryHandle,
    ) -> Result<AgentEventStream, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(input.to_string());
        }

        let next = self
            .responses
            .lock()
            .map_err(|e| AgentError::Request(e.to_string()))?
            .pop_front();
        next.ok_or_else(|| AgentError::InvalidResponse("No scripted response left".into()))?
            .into_stream()
    }
}
