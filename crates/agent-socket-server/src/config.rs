//! Command line and environment configuration.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use agent_socket_agents::{OfflineAgent, OpenAIAgent, OpenAIConfig, ToolRegistry};
use agent_socket_core::{Agent, MemoryBackend, MemoryError};
use agent_socket_session::{SessionConfig, storage::InMemoryBackend};
use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("An OpenAI API key is required for the openai agent (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("SQLite memory requires building with the `sqlite` feature")]
    SqliteUnavailable,
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Agent implementation driving conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Openai,
    Offline,
}

/// Where conversation memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MemoryKind {
    Memory,
    Sqlite,
}

/// Streaming agent WebSocket server
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-socket-server", version)]
pub struct Args {
    /// Bind host
    #[arg(long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port
    #[arg(long, env = "SERVER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Seconds to wait for user input before closing a connection
    #[arg(long, env = "INACTIVITY_TIMEOUT_SECS", default_value_t = 15)]
    pub inactivity_timeout_secs: u64,

    /// Send a `start` frame as soon as a connection opens
    #[arg(long, env = "SESSION_OPEN_FRAME", default_value_t = true, action = ArgAction::Set)]
    pub open_frame: bool,

    /// Agent implementation
    #[arg(long, env = "AGENT_KIND", value_enum, default_value_t = AgentKind::Openai)]
    pub agent: AgentKind,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Chat model
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// System prompt prepended to every model request
    #[arg(
        long,
        env = "SYSTEM_PROMPT",
        default_value = agent_socket_agents::openai::agent::DEFAULT_SYSTEM_PROMPT
    )]
    pub system_prompt: String,

    /// Conversation memory backend
    #[arg(long, env = "MEMORY_BACKEND", value_enum, default_value_t = MemoryKind::Memory)]
    pub memory: MemoryKind,

    /// Database URL for the sqlite backend
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://agent-socket.db")]
    pub database_url: String,
}

impl Args {
    /// Check settings that depend on each other.
    ///
    /// # Errors
    /// Returns error if the openai agent has no key, or sqlite memory is
    /// requested from a build without it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent == AgentKind::Openai
            && self.openai_api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingApiKey);
        }
        if self.memory == MemoryKind::Sqlite && !cfg!(feature = "sqlite") {
            return Err(ConfigError::SqliteUnavailable);
        }
        Ok(())
    }

    /// Address to listen on.
    ///
    /// # Errors
    /// Returns error if host and port do not form a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }

    /// Per-connection session settings.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            open_frame: self.open_frame,
        }
    }

    /// Build the configured agent.
    ///
    /// # Errors
    /// Returns error if the openai agent has no key.
    pub fn build_agent(&self) -> Result<Arc<dyn Agent>, ConfigError> {
        match self.agent {
            AgentKind::Offline => Ok(Arc::new(OfflineAgent::new())),
            AgentKind::Openai => {
                let key = self
                    .openai_api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or(ConfigError::MissingApiKey)?;
                let config = OpenAIConfig::new(key)
                    .with_base_url(&self.openai_base_url)
                    .with_model(&self.model);
                Ok(Arc::new(
                    OpenAIAgent::new(config)
                        .with_tools(ToolRegistry::with_defaults())
                        .with_system_prompt(&self.system_prompt),
                ))
            }
        }
    }

    /// Build the configured memory backend.
    ///
    /// # Errors
    /// Returns error if the backend is unavailable or cannot connect.
    pub async fn build_memory(&self) -> Result<Arc<dyn MemoryBackend>, ConfigError> {
        match self.memory {
            MemoryKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
            #[cfg(feature = "sqlite")]
            MemoryKind::Sqlite => Ok(Arc::new(
                agent_socket_session::storage::SqliteBackend::new(&self.database_url).await?,
            )),
            #[cfg(not(feature = "sqlite"))]
            MemoryKind::Sqlite => Err(ConfigError::SqliteUnavailable),
        }
    }
}
