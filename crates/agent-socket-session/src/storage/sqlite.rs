//! SQLite conversation memory (feature-gated).

use std::{str::FromStr, sync::Arc};

use agent_socket_core::{
    ConversationItem, ConversationMemory, MemoryBackend, MemoryError, MemoryHandle, SessionId,
    protocol::timestamp,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS conversation_items (
    session_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    item TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, seq)
)";

fn internal(e: sqlx::Error) -> MemoryError {
    MemoryError::Internal(e.to_string())
}

/// SQLite memory backend.
///
/// Conversations outlive the process; each session still only reads the
/// rows keyed by its own identifier.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect to a database, creating it and the schema if needed.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the database cannot be opened.
    pub async fn new(database_url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    /// Returns error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, MemoryError> {
        // A single connection that never expires keeps the database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        sqlx::query(SCHEMA).execute(&pool).await.map_err(internal)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn open(&self, session_id: SessionId) -> Result<MemoryHandle, MemoryError> {
        Ok(Arc::new(SqliteConversation {
            session_id,
            pool: self.pool.clone(),
        }))
    }
}

struct SqliteConversation {
    session_id: SessionId,
    pool: SqlitePool,
}

#[async_trait]
impl ConversationMemory for SqliteConversation {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    async fn history(&self) -> Result<Vec<ConversationItem>, MemoryError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT item FROM conversation_items WHERE session_id = ?1 ORDER BY seq",
        )
        .bind(self.session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.iter()
            .map(|row| serde_json::from_str(row).map_err(MemoryError::from))
            .collect()
    }

    async fn append(&self, item: ConversationItem) -> Result<(), MemoryError> {
        let json = serde_json::to_string(&item)?;
        sqlx::query(
            "INSERT INTO conversation_items (session_id, seq, item, created_at)
             SELECT ?1, COALESCE(MAX(seq), -1) + 1, ?2, ?3
             FROM conversation_items WHERE session_id = ?1",
        )
        .bind(self.session_id.to_string())
        .bind(json)
        .bind(timestamp())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_history_round_trips_in_order() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let memory = backend.open(Uuid::new_v4()).await.unwrap();

        memory.append(ConversationItem::user("What are my transactions?")).await.unwrap();
        memory
            .append(ConversationItem::tool("call_1", "get_transactions", r#"{"data":[]}"#))
            .await
            .unwrap();

        let history = memory.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationItem::user("What are my transactions?"));
        assert!(matches!(history[1], ConversationItem::Tool { .. }));
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_rows() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let a = backend.open(Uuid::new_v4()).await.unwrap();
        let b = backend.open(Uuid::new_v4()).await.unwrap();

        a.append(ConversationItem::user("My name is Alice")).await.unwrap();
        b.append(ConversationItem::user("hello")).await.unwrap();

        assert_eq!(a.history().await.unwrap().len(), 1);
        assert_eq!(b.history().await.unwrap(), vec![ConversationItem::user("hello")]);
    }
}
