//! Agents that drive conversation turns.
//!
//! Provides:
//! - An OpenAI-compatible streaming agent with a tool-calling loop
//! - A rule-based offline agent for local runs
//! - A scripted mock agent for tests
//! - The tool registry shared by all of them

pub mod mock;
pub mod offline;
pub mod openai;
pub mod tools;

pub use mock::{MockAgent, MockResponse};
pub use offline::OfflineAgent;
pub use openai::{OpenAIAgent, OpenAIConfig};
pub use tools::{GetTransactions, Tool, ToolDefinition, ToolError, ToolRegistry};
