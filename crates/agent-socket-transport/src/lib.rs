//! Transport layer for agent sessions.
//!
//! Provides:
//! - WebSocket connection supervisor (feature: websocket)
//! - Health route

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::{SessionError, WsState, create_router};
