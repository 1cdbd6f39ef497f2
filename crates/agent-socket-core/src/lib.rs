//! Core abstractions for streaming a conversational agent over a socket.
//!
//! This crate provides the fundamental building blocks:
//! - `AgentEvent` - Raw events an agent emits during a turn
//! - `ServerMessage` - Typed wire protocol sent to clients
//! - `ConversationItem` - Entries of a session's conversational memory
//! - `Agent`, `ConversationMemory` and `MemoryBackend` traits

pub mod conversation;
pub mod event;
pub mod protocol;
pub mod traits;

pub use conversation::{ConversationItem, ToolCall};
pub use event::{AgentEvent, MessageChunk, ToolCallChunk, ToolOutput};
pub use protocol::{ErrorCode, ServerMessage};
pub use traits::{
    Agent, AgentError, AgentEventStream, ConversationMemory, MemoryBackend, MemoryError,
    MemoryHandle, SessionId,
};
