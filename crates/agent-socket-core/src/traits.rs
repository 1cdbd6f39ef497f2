//! Core traits for conversational memory and agents.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::{AgentEvent, ConversationItem};

/// Session identifier.
pub type SessionId = Uuid;

/// Memory error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory backend unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt conversation item: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Memory error: {0}")]
    Internal(String),
}

/// Conversational context scoped to exactly one session.
///
/// A handle is opened when a connection is accepted and dropped when the
/// session closes. It is never shared between sessions.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Session this memory belongs to.
    fn session_id(&self) -> SessionId;

    /// All items recorded so far, oldest first.
    async fn history(&self) -> Result<Vec<ConversationItem>, MemoryError>;

    /// Append one item.
    async fn append(&self, item: ConversationItem) -> Result<(), MemoryError>;
}

/// Shared handle to a session's memory.
pub type MemoryHandle = Arc<dyn ConversationMemory>;

/// Trait for memory backends.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Open a fresh memory scope for a session.
    async fn open(&self, session_id: SessionId) -> Result<MemoryHandle, MemoryError>;
}

/// Agent error.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model request failed: {0}")]
    Request(String),
    #[error("Model API error: {0}")]
    Api(String),
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
    #[error("Tool loop exceeded {0} iterations")]
    IterationLimit(usize),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Arrival-ordered events for a single turn.
pub type AgentEventStream = BoxStream<'static, Result<AgentEvent, AgentError>>;

/// Trait for agent capabilities.
///
/// Given user text and a memory handle, an agent produces the events of one
/// turn. It is responsible for reading and updating the memory; callers only
/// consume the stream.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Start a turn.
    async fn stream(&self, input: &str, memory: MemoryHandle)
    -> Result<AgentEventStream, AgentError>;
}
