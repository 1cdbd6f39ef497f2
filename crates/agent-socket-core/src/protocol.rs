//! Wire protocol sent from server to client.
//!
//! Every outbound frame is one JSON object tagged by `type`. Inbound frames
//! are plain text and need no type here.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message shown to the client when a session times out.
pub const TIMEOUT_MESSAGE: &str = "Connection timed out due to user inactivity.";

/// Message shown to the client when a turn fails.
pub const PROCESSING_ERROR_MESSAGE: &str = "Error processing message, please try again later.";

/// Message shown to the client when the session cannot be set up.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Agent unavailable, please try again later.";

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No input arrived within the inactivity window.
    Timeout,
    /// The agent failed while producing a turn.
    ProcessingError,
    #[default]
    UnknownError,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session opened or turn started.
    Start { timestamp: String },
    /// Agent invoked a tool.
    ToolCall {
        tool_name: String,
        tool_args: Value,
        tool_call_id: String,
    },
    /// Tool invocation completed.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
    },
    /// Text fragment plus everything streamed so far in this turn.
    ContentDelta { delta: String, accumulated: String },
    /// Final text of the turn.
    ContentComplete { content: String },
    /// User-facing error.
    Error {
        message: String,
        #[serde(default)]
        code: ErrorCode,
    },
    /// Turn finished.
    End { timestamp: String },
}

/// Current UTC time as ISO-8601 with microseconds and a `Z` suffix.
#[must_use]
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ServerMessage {
    /// Start message stamped now.
    #[must_use]
    pub fn start() -> Self {
        Self::Start {
            timestamp: timestamp(),
        }
    }

    /// End message stamped now.
    #[must_use]
    pub fn end() -> Self {
        Self::End {
            timestamp: timestamp(),
        }
    }

    /// Error message with an explicit code.
    #[must_use]
    pub fn error(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// Inactivity timeout error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::error(TIMEOUT_MESSAGE, ErrorCode::Timeout)
    }

    /// Generic turn failure error.
    #[must_use]
    pub fn processing_error() -> Self {
        Self::error(PROCESSING_ERROR_MESSAGE, ErrorCode::ProcessingError)
    }

    /// Wire name of this message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ContentDelta { .. } => "content_delta",
            Self::ContentComplete { .. } => "content_complete",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }

    /// Whether this message ends a turn.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End { .. })
    }
}
