//! WebSocket connection supervisor.
//!
//! Every accepted socket gets a fresh session id, its own conversation
//! memory and its own task. Nothing is shared between connections except the
//! agent and the memory backend they were opened from.

use std::sync::Arc;

use agent_socket_core::{
    Agent, ErrorCode, MemoryBackend, MemoryError, ServerMessage, SessionId,
    protocol::UNKNOWN_ERROR_MESSAGE,
};
use agent_socket_session::{
    CloseReason, Outbound, Session, SessionConfig, machine::NORMAL_CLOSURE,
};
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{
    SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::json;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

/// Session failure outside the normal timeout and disconnect paths.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to open session memory: {0}")]
    Memory(#[from] MemoryError),
    #[error("Session task failed: {0}")]
    Task(#[from] JoinError),
}

/// WebSocket handler state.
#[derive(Clone)]
pub struct WsState {
    pub agent: Arc<dyn Agent>,
    pub memory: Arc<dyn MemoryBackend>,
    pub config: SessionConfig,
}

impl WsState {
    /// Create new WebSocket state.
    #[must_use]
    pub fn new(
        agent: Arc<dyn Agent>,
        memory: Arc<dyn MemoryBackend>,
        config: SessionConfig,
    ) -> Self {
        Self {
            agent,
            memory,
            config,
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Create the application router.
///
/// Serves the agent socket at `/ws/agent` and the liveness probe at
/// `/health`.
#[must_use]
pub fn create_router(state: WsState) -> Router {
    Router::new()
        .route("/ws/agent", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let session_id = Uuid::new_v4();
    let (sender, receiver) = socket.split();
    tracing::info!(%session_id, "Connection accepted");

    // Channel for sending messages to the client
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
    let send_task = tokio::spawn(forward_outbound(sender, rx, session_id));

    match supervise(session_id, receiver, tx, &state).await {
        Ok(CloseReason::Timeout) => tracing::info!(%session_id, "Session timed out"),
        Ok(CloseReason::Disconnected) => tracing::debug!(%session_id, "Client disconnected"),
        Err(e) => tracing::error!(%session_id, error = %e, "Session failed"),
    }

    // The writer stops once every sender is gone, after flushing what is queued.
    if let Err(e) = send_task.await {
        tracing::error!(%session_id, error = %e, "Send task failed");
    }
}

async fn supervise(
    session_id: SessionId,
    receiver: SplitStream<WebSocket>,
    tx: mpsc::UnboundedSender<Outbound>,
    state: &WsState,
) -> Result<CloseReason, SessionError> {
    let memory = match state.memory.open(session_id).await {
        Ok(memory) => memory,
        Err(e) => {
            let _ = tx.send(Outbound::Message(ServerMessage::error(
                UNKNOWN_ERROR_MESSAGE,
                ErrorCode::UnknownError,
            )));
            let _ = tx.send(Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "session unavailable".to_string(),
            });
            return Err(e.into());
        }
    };
    tracing::debug!(%session_id, backend = state.memory.name(), "Session memory opened");

    let session = Session::new(
        session_id,
        memory,
        Arc::clone(&state.agent),
        state.config.clone(),
    );
    let inbound = Box::pin(inbound_text(receiver, session_id));

    // A panic inside the session surfaces here instead of unwinding the server.
    Ok(tokio::spawn(session.run(inbound, tx)).await?)
}

/// User messages carried by the socket, ending at close or on error.
fn inbound_text(
    mut receiver: SplitStream<WebSocket>,
    session_id: SessionId,
) -> impl Stream<Item = String> + Send {
    async_stream::stream! {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => yield text.as_str().to_owned(),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => yield text,
                    Err(_) => {
                        tracing::debug!(%session_id, "Ignoring non UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%session_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }
}

async fn forward_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    session_id: SessionId,
) {
    while let Some(item) = rx.recv().await {
        let frame = match item {
            Outbound::Message(msg) => match serde_json::to_string(&msg) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    tracing::error!(%session_id, "Failed to serialize message: {e}");
                    continue;
                }
            },
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                    tracing::debug!(%session_id, error = %e, "Failed to send close frame");
                }
                break;
            }
        };
        if sender.send(frame).await.is_err() {
            tracing::debug!(%session_id, "Client went away mid-send");
            break;
        }
    }
}
