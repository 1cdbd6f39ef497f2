//! Rule-based agent that runs without a model.
//!
//! Covers what a local demo needs: greetings, the transactions tool, and
//! recalling facts the user stated earlier in the same conversation. Every
//! answer is read from the conversation memory it is handed, so nothing
//! leaks between sessions.

use agent_socket_core::{
    Agent, AgentError, AgentEvent, AgentEventStream, ConversationItem, MemoryHandle, ToolCall,
    ToolCallChunk,
};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::tools::{GetTransactions, Tool, ToolRegistry};

const GREETING: &str = "Hello! How can I help you today?";
const FALLBACK: &str = "I'm running offline. I can show your recent transactions or remember \
                        things you tell me, like your name or your favorite color.";

/// Offline agent.
#[derive(Clone)]
pub struct OfflineAgent {
    tools: ToolRegistry,
}

impl Default for OfflineAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineAgent {
    /// Create an offline agent with the built-in tools.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: ToolRegistry::with_defaults(),
        }
    }

    async fn transactions(
        &self,
        memory: &MemoryHandle,
        events: &mut Vec<AgentEvent>,
    ) -> Result<String, AgentError> {
        let call = ToolCall::new(
            format!("call_{}", Uuid::new_v4().simple()),
            GetTransactions.name(),
            json!({}),
        );
        memory
            .append(ConversationItem::assistant_with_tools("", vec![call.clone()]))
            .await?;
        events.push(AgentEvent::tool_calls(vec![ToolCallChunk::new(
            &call.id,
            &call.name,
            call.arguments.clone(),
        )]));

        let output = self.tools.invoke(&call).await;
        memory
            .append(ConversationItem::tool(&call.id, &call.name, &output))
            .await?;
        events.push(AgentEvent::tool_result(&call.id, &call.name, &output));

        Ok(summarize_transactions(&output))
    }
}

#[async_trait]
impl Agent for OfflineAgent {
    async fn stream(
        &self,
        input: &str,
        memory: MemoryHandle,
    ) -> Result<AgentEventStream, AgentError> {
        let history = memory.history().await?;
        memory.append(ConversationItem::user(input)).await?;

        let mut events = Vec::new();
        let reply = match Intent::parse(input) {
            Intent::Greeting => GREETING.to_string(),
            Intent::CountTransactions => match last_transactions(&history) {
                Some(count) => format!("You have {count} recent transactions."),
                None => self.transactions(&memory, &mut events).await?,
            },
            Intent::Transactions => self.transactions(&memory, &mut events).await?,
            Intent::StateName(name) => format!("Nice to meet you, {name}!"),
            Intent::StateFavorite(topic, value) => {
                format!("Got it, your favorite {topic} is {value}.")
            }
            Intent::AskName => recall(&history, |intent| match intent {
                Intent::StateName(name) => Some(format!("Your name is {name}.")),
                _ => None,
            })
            .unwrap_or_else(|| "I don't know your name yet. Tell me and I'll remember it.".into()),
            Intent::AskFavorite(topic) => recall(&history, |intent| match intent {
                Intent::StateFavorite(t, value) if t.eq_ignore_ascii_case(&topic) => {
                    Some(format!("Your favorite {topic} is {value}."))
                }
                _ => None,
            })
            .unwrap_or_else(|| format!("I don't know your favorite {topic} yet.")),
            Intent::Unknown => FALLBACK.to_string(),
        };

        memory.append(ConversationItem::assistant(&reply)).await?;
        events.extend(reply.split_inclusive(' ').map(AgentEvent::text));

        tracing::debug!(session_id = %memory.session_id(), events = events.len(), "Offline reply");
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Intent {
    Greeting,
    Transactions,
    CountTransactions,
    StateName(String),
    StateFavorite(String, String),
    AskName,
    AskFavorite(String),
    Unknown,
}

impl Intent {
    fn parse(input: &str) -> Self {
        let text = input.trim().trim_end_matches(['.', '!', '?']).trim();
        // ASCII lowering keeps byte offsets aligned with `text`.
        let lower = text.to_ascii_lowercase();

        if lower.contains("transaction") {
            if lower.contains("how many") {
                return Self::CountTransactions;
            }
            return Self::Transactions;
        }
        if lower == "what is my name" || lower == "what's my name" {
            return Self::AskName;
        }
        if let Some(topic) = lower
            .strip_prefix("what is my favorite ")
            .or_else(|| lower.strip_prefix("what's my favorite "))
        {
            return Self::AskFavorite(topic.trim().to_string());
        }
        if let Some(name) = after(text, &lower, "my name is ") {
            return Self::StateName(name.to_string());
        }
        if let Some(rest) = after(text, &lower, "my favorite ") {
            let rest_lower = rest.to_ascii_lowercase();
            if let Some(pos) = rest_lower.find(" is ") {
                let topic = rest[..pos].trim().to_ascii_lowercase();
                let value = rest[pos + 4..].trim();
                if !topic.is_empty() && !value.is_empty() {
                    return Self::StateFavorite(topic, value.to_string());
                }
            }
        }
        if lower.is_empty()
            || ["hello", "hi", "hey"]
                .iter()
                .any(|g| lower.split_whitespace().any(|w| w == *g))
        {
            return Self::Greeting;
        }
        Self::Unknown
    }
}

/// Slice of `text` following `marker`, located through its lowered copy.
fn after<'a>(text: &'a str, lower: &str, marker: &str) -> Option<&'a str> {
    let start = lower.find(marker)? + marker.len();
    let rest = text[start..].trim();
    (!rest.is_empty()).then_some(rest)
}

/// Most recent answer derivable from the user's earlier statements.
fn recall(history: &[ConversationItem], find: impl Fn(Intent) -> Option<String>) -> Option<String> {
    history.iter().rev().find_map(|item| match item {
        ConversationItem::User { content } => find(Intent::parse(content)),
        _ => None,
    })
}

/// Transaction count from the latest tool result in history.
fn last_transactions(history: &[ConversationItem]) -> Option<usize> {
    history.iter().rev().find_map(|item| match item {
        ConversationItem::Tool { name, content, .. } if name == GetTransactions.name() => {
            transaction_list(content).map(|txns| txns.len())
        }
        _ => None,
    })
}

fn transaction_list(output: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(output).ok()?;
    value.get("data")?.as_array().cloned()
}

fn summarize_transactions(output: &str) -> String {
    let Some(txns) = transaction_list(output) else {
        return "I couldn't load your transactions right now.".to_string();
    };
    let lines: Vec<String> = txns
        .iter()
        .map(|t| {
            format!(
                "{} on {}",
                t["amount"].as_str().unwrap_or("?"),
                t["date_time"].as_str().unwrap_or("?")
            )
        })
        .collect();
    format!(
        "You have {} recent transactions: {}.",
        txns.len(),
        lines.join(", ")
    )
}
