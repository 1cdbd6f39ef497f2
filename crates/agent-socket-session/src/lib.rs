//! Session protocol engine for streaming agents.
//!
//! Provides:
//! - `translate_turn` - Project one agent turn onto protocol messages
//! - `Session` - Per-connection lifecycle state machine
//! - Memory backends (in-process, SQLite)

pub mod machine;
pub mod storage;
pub mod translator;

pub use machine::{CloseReason, Outbound, Session, SessionConfig, SessionState};
pub use translator::{Turn, TurnError, TurnStream, translate_turn};
