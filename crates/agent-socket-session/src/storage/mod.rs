//! Memory backend implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::{InMemoryBackend, InMemoryConversation};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
