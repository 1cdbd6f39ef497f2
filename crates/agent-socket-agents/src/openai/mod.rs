//! OpenAI-compatible streaming agent.

pub mod agent;
pub mod stream;
pub mod types;

pub use agent::OpenAIAgent;
pub use types::OpenAIConfig;
