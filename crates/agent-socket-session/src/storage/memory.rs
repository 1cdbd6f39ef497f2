//! In-process conversation memory.

use std::sync::{Arc, RwLock};

use agent_socket_core::{
    ConversationItem, ConversationMemory, MemoryBackend, MemoryError, MemoryHandle, SessionId,
};
use async_trait::async_trait;

/// In-memory backend.
///
/// Every `open` hands out a brand new conversation owned by the caller.
/// Nothing is kept here, so conversations vanish with their session and
/// cannot be reached from another one.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend;

impl InMemoryBackend {
    /// Create a new in-memory backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, session_id: SessionId) -> Result<MemoryHandle, MemoryError> {
        Ok(Arc::new(InMemoryConversation::new(session_id)))
    }
}

/// Conversation held in process memory.
pub struct InMemoryConversation {
    session_id: SessionId,
    items: RwLock<Vec<ConversationItem>>,
}

impl InMemoryConversation {
    /// Create an empty conversation.
    #[must_use]
    pub const fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            items: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversation {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    async fn history(&self) -> Result<Vec<ConversationItem>, MemoryError> {
        Ok(self
            .items
            .read()
            .map_err(|e| MemoryError::Internal(e.to_string()))?
            .clone())
    }

    async fn append(&self, item: ConversationItem) -> Result<(), MemoryError> {
        self.items
            .write()
            .map_err(|e| MemoryError::Internal(e.to_string()))?
            .push(item);
        Ok(())
    }
}
