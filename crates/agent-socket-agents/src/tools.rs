//! Tools agents can invoke.

use std::{collections::HashMap, sync::Arc};

use agent_socket_core::ToolCall;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Tool error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Tool failed: {0}")]
    Failed(String),
}

/// Trait for tools exposed to agents.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool.
    fn name(&self) -> &str;

    /// Human-readable description sent to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments.
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    /// Run the tool.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Tool description as advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Set of tools available to an agent.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with(GetTransactions)
    }

    /// Add a tool, replacing any tool with the same name.
    #[must_use]
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Add a shared tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of all tools, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run a tool call.
    ///
    /// # Errors
    /// Returns error if the tool is unknown or fails.
    pub async fn call(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        tool.call(call.arguments.clone()).await
    }

    /// Run a tool call and render its output as the text handed back to
    /// the model. Failures become an error string rather than aborting the
    /// turn, so the model can react to them.
    pub async fn invoke(&self, call: &ToolCall) -> String {
        match self.call(call).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    error = %e,
                    "Tool call failed"
                );
                format!("Error: {e}")
            }
        }
    }
}

/// Returns the user's recent financial transactions.
#[derive(Debug, Default, Clone, Copy)]
pub struct GetTransactions;

#[async_trait]
impl Tool for GetTransactions {
    fn name(&self) -> &str {
        "get_transactions"
    }

    fn description(&self) -> &str {
        "Get financial transactions."
    }

    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!({
            "data": [
                {
                    "id": "1",
                    "amount": "-10.99",
                    "date_time": "2025-10-05T00:00:00Z",
                },
                {
                    "id": "2",
                    "amount": "100.45",
                    "date_time": "2025-10-04T00:00:00Z",
                },
            ]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        async fn call(&self, _args: Value) -> Result<Value, ToolError> {
            Err(ToolError::Failed("backend down".into()))
        }
    }

    #[tokio::test]
    async fn test_get_transactions_shape() {
        let registry = ToolRegistry::with_defaults();
        let value = registry
            .call(&ToolCall::new("call_1", "get_transactions", json!({})))
            .await
            .unwrap();

        let data = value["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["amount"], "-10.99");
    }

    #[tokio::test]
    async fn test_invoke_renders_failures_as_text() {
        let registry = ToolRegistry::with_defaults().with(Failing);

        let missing = registry
            .invoke(&ToolCall::new("call_1", "nope", json!({})))
            .await;
        assert_eq!(missing, "Error: Unknown tool: nope");

        let failed = registry
            .invoke(&ToolCall::new("call_2", "failing", json!({})))
            .await;
        assert!(failed.contains("backend down"));
    }

    #[test]
    fn test_definitions_sorted() {
        let registry = ToolRegistry::with_defaults().with(Failing);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["failing", "get_transactions"]);
    }
}
