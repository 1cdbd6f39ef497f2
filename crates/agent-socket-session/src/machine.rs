//! Connection lifecycle state machine.

use std::{sync::Arc, time::Duration};

use agent_socket_core::{Agent, MemoryHandle, ServerMessage, SessionId};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::SendError};

use crate::translator::translate_turn;

/// WebSocket close code for normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Default inactivity window.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(15);

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for user input before closing.
    pub inactivity_timeout: Duration,
    /// Emit a `start` frame when the connection opens.
    pub open_frame: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            open_frame: true,
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    ProcessingTurn,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No input arrived within the inactivity window.
    Timeout,
    /// The peer went away.
    Disconnected,
}

/// Item handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

/// State machine for one connection.
///
/// Owns the session's memory handle; it is released when the session is
/// dropped after [`Session::run`] returns.
pub struct Session {
    id: SessionId,
    memory: MemoryHandle,
    agent: Arc<dyn Agent>,
    config: SessionConfig,
    state: SessionState,
}

impl Session {
    /// Create a session bound to its identifier and memory.
    #[must_use]
    pub fn new(
        id: SessionId,
        memory: MemoryHandle,
        agent: Arc<dyn Agent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            memory,
            agent,
            config,
            state: SessionState::AwaitingInput,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session until timeout or disconnect.
    ///
    /// `inbound` yields user messages and ends when the peer disconnects.
    /// Every outbound message goes through `outbound` in order; a closed
    /// channel is treated as a disconnect.
    pub async fn run<S>(
        mut self,
        mut inbound: S,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> CloseReason
    where
        S: Stream<Item = String> + Unpin + Send,
    {
        tracing::debug!(session_id = %self.id, "Session opened");

        if self.config.open_frame && emit(&outbound, ServerMessage::start()).is_err() {
            return self.close(CloseReason::Disconnected);
        }

        loop {
            self.transition(SessionState::AwaitingInput);

            let next = tokio::time::timeout(self.config.inactivity_timeout, inbound.next());
            let input = match next.await {
                Ok(Some(input)) => input,
                Ok(None) => return self.close(CloseReason::Disconnected),
                Err(_) => {
                    tracing::info!(
                        session_id = %self.id,
                        "Closing connection due to user inactivity"
                    );
                    let _ = emit(&outbound, ServerMessage::timeout());
                    let _ = outbound.send(Outbound::Close {
                        code: NORMAL_CLOSURE,
                        reason: "inactivity timeout".to_string(),
                    });
                    return self.close(CloseReason::Timeout);
                }
            };

            self.transition(SessionState::ProcessingTurn);
            if self.run_turn(input, &outbound).await.is_err() {
                return self.close(CloseReason::Disconnected);
            }
        }
    }

    async fn run_turn(
        &self,
        input: String,
        outbound: &mpsc::UnboundedSender<Outbound>,
    ) -> Result<(), SendError<Outbound>> {
        tracing::debug!(session_id = %self.id, chars = input.len(), "Processing turn");

        let mut messages = translate_turn(Arc::clone(&self.agent), input, Arc::clone(&self.memory));
        while let Some(next) = messages.next().await {
            match next {
                Ok(msg) => emit(outbound, msg)?,
                Err(e) => {
                    tracing::error!(
                        session_id = %self.id,
                        error = %e,
                        "Error processing agent events"
                    );
                    emit(outbound, ServerMessage::processing_error())?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(
            session_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Session transition"
        );
        self.state = next;
    }

    fn close(mut self, reason: CloseReason) -> CloseReason {
        self.transition(SessionState::Closed);
        tracing::debug!(session_id = %self.id, ?reason, "Session closed");
        reason
    }
}

fn emit(
    outbound: &mpsc::UnboundedSender<Outbound>,
    msg: ServerMessage,
) -> Result<(), SendError<Outbound>> {
    outbound.send(Outbound::Message(msg))
}

#[cfg(test)]
mod tests {
    use agent_socket_agents::{MockAgent, MockResponse, OfflineAgent};
    use agent_socket_core::{AgentEvent, ErrorCode, MemoryBackend};
    use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use uuid::Uuid;

    use super::*;
    use crate::storage::InMemoryBackend;

    struct Harness {
        input: mpsc::UnboundedSender<String>,
        output: UnboundedReceiver<Outbound>,
        task: JoinHandle<CloseReason>,
    }

    impl Harness {
        async fn spawn(
            agent: Arc<dyn Agent>,
            backend: &InMemoryBackend,
            config: SessionConfig,
        ) -> Self {
            let id = Uuid::new_v4();
            let memory = backend.open(id).await.unwrap();
            let (input, input_rx) = mpsc::unbounded_channel();
            let (output_tx, output) = mpsc::unbounded_channel();
            let session = Session::new(id, memory, agent, config);
            let task = tokio::spawn(session.run(UnboundedReceiverStream::new(input_rx), output_tx));
            Self { input, output, task }
        }

        async fn next_message(&mut self) -> ServerMessage {
            match self.output.recv().await {
                Some(Outbound::Message(msg)) => msg,
                other => panic!("expected message, got {other:?}"),
            }
        }

        /// Send one input and collect its turn through `end` or `error`.
        async fn turn(&mut self, input: &str) -> Vec<ServerMessage> {
            self.input.send(input.to_string()).unwrap();
            let mut out = Vec::new();
            loop {
                let msg = self.next_message().await;
                let done = matches!(msg, ServerMessage::End { .. } | ServerMessage::Error { .. });
                out.push(msg);
                if done {
                    return out;
                }
            }
        }
    }

    fn text(messages: &[ServerMessage]) -> String {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::ContentDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    fn per_turn_only() -> SessionConfig {
        SessionConfig {
            open_frame: false,
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_frame_then_timeout_closes_session() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![]));
        let mut h = Harness::spawn(agent, &backend, SessionConfig::default()).await;

        assert!(matches!(h.next_message().await, ServerMessage::Start { .. }));
        assert_eq!(h.next_message().await, ServerMessage::timeout());
        assert_eq!(
            h.output.recv().await,
            Some(Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "inactivity timeout".into()
            })
        );
        assert_eq!(h.output.recv().await, None);
        assert_eq!(h.task.await.unwrap(), CloseReason::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_first_frame_without_open_frame() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        let started = tokio::time::Instant::now();
        match h.next_message().await {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, ErrorCode::Timeout);
                assert!(message.to_lowercase().contains("inactivity"));
            }
            other => panic!("expected timeout error, got {other:?}"),
        }
        assert!(started.elapsed() >= DEFAULT_INACTIVITY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_restarts_inactivity_timer() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![
            MockResponse::text("first"),
            MockResponse::text("second"),
        ]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        let first = h.turn("First message").await;
        assert!(first.last().unwrap().is_end());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = h.turn("Second message").await;
        assert!(second.last().unwrap().is_end());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.output.try_recv().is_err(), "timed out too early");

        assert_eq!(h.next_message().await, ServerMessage::timeout());
    }

    #[tokio::test]
    async fn test_turn_failure_keeps_session_alive() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![
            MockResponse::FailAfter(vec![AgentEvent::text("half")], "model exploded".into()),
            MockResponse::text("recovered"),
        ]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        let failed = h.turn("Test message").await;
        assert!(matches!(failed[0], ServerMessage::Start { .. }));
        assert_eq!(failed.last().unwrap(), &ServerMessage::processing_error());
        assert!(!failed.iter().any(ServerMessage::is_end));
        let ServerMessage::Error { message, .. } = failed.last().unwrap() else {
            unreachable!()
        };
        assert!(!message.contains("exploded"));

        let ok = h.turn("again").await;
        assert_eq!(text(&ok), "recovered");
        assert!(ok.last().unwrap().is_end());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_turn_is_not_cut_by_inactivity_timer() {
        let backend = InMemoryBackend::new();
        let slow = MockResponse::text("eventually").delayed(DEFAULT_INACTIVITY_TIMEOUT * 3);
        let agent = Arc::new(MockAgent::new(vec![slow]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        let started = tokio::time::Instant::now();
        let out = h.turn("take your time").await;
        assert!(started.elapsed() >= DEFAULT_INACTIVITY_TIMEOUT * 3);
        assert_eq!(
            out.iter().map(ServerMessage::kind).collect::<Vec<_>>(),
            vec!["start", "content_delta", "content_complete", "end"]
        );

        // The timer only starts again once the turn is over.
        let ended = tokio::time::Instant::now();
        assert_eq!(h.next_message().await, ServerMessage::timeout());
        assert!(ended.elapsed() >= DEFAULT_INACTIVITY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_turns_are_sequential() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![
            MockResponse::text("one"),
            MockResponse::text("two"),
        ]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        h.input.send("a".into()).unwrap();
        h.input.send("b".into()).unwrap();

        let mut kinds = Vec::new();
        for _ in 0..8 {
            kinds.push(h.next_message().await.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "start",
                "content_delta",
                "content_complete",
                "end",
                "start",
                "content_delta",
                "content_complete",
                "end"
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_ends_session_silently() {
        let backend = InMemoryBackend::new();
        let agent = Arc::new(MockAgent::new(vec![]));
        let mut h = Harness::spawn(agent, &backend, per_turn_only()).await;

        drop(h.input);
        assert_eq!(h.task.await.unwrap(), CloseReason::Disconnected);
        assert_eq!(h.output.recv().await, None);
    }

    #[tokio::test]
    async fn test_empty_input_is_a_valid_turn() {
        let backend = InMemoryBackend::new();
        let mut h = Harness::spawn(Arc::new(OfflineAgent::new()), &backend, per_turn_only()).await;

        let out = h.turn("").await;
        assert!(matches!(out.first(), Some(ServerMessage::Start { .. })));
        assert!(out.last().unwrap().is_end());
    }

    #[tokio::test]
    async fn test_memory_persists_within_session() {
        let backend = InMemoryBackend::new();
        let mut h = Harness::spawn(Arc::new(OfflineAgent::new()), &backend, per_turn_only()).await;

        h.turn("My favorite color is blue").await;
        h.turn("My favorite food is pizza").await;
        let answer = h.turn("What is my favorite color?").await;
        assert!(text(&answer).to_lowercase().contains("blue"));
    }

    #[tokio::test]
    async fn test_memory_is_isolated_between_sessions() {
        let backend = InMemoryBackend::new();
        let agent: Arc<dyn Agent> = Arc::new(OfflineAgent::new());

        let mut a = Harness::spawn(Arc::clone(&agent), &backend, per_turn_only()).await;
        a.turn("My name is Bob").await;
        let recalled = a.turn("What is my name?").await;
        assert!(text(&recalled).contains("Bob"));

        let mut b = Harness::spawn(agent, &backend, per_turn_only()).await;
        let answer = b.turn("What is my name?").await;
        assert!(!text(&answer).to_lowercase().contains("bob"));
    }
}
