//! Per-session protocol state machine.
//!
//! [`Protocol::serve`] reads frames from one connection until the peer sends
//! Fin or something goes wrong.  Each frame is classified by its flags:
//!
//! | flags           | action                                           |
//! |-----------------|--------------------------------------------------|
//! | `HEARTBEAT`     | reply `HEARTBEAT \| SUCCESS`, keep reading        |
//! | `ECHO`          | reply `ECHO \| SUCCESS`, keep reading             |
//! | `FIN`           | stop, graceful                                   |
//! | `DATA`          | run the handler registered for the command id    |
//! | anything else   | stop, malformed request                          |
//!
//! There are no retries.  Any error ends the session; the caller is
//! responsible for closing and deregistering it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use vboard_core::{FrameError, FrameKind, Message, OptionFlags};

use crate::application::handler::{HandlerError, HandlerRegistry, ReplySink};
use crate::application::keyboard::{KeyInjector, KeyboardHandler};
use crate::domain::config::ServerConfig;

/// Why a session stopped being served.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The byte stream did not contain a well-formed frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// A Data frame named a command with no registered handler.
    #[error("unknown command 0x{0:02X}")]
    UnknownCommand(u8),

    /// No complete frame arrived within the read timeout.
    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    /// The handler for a Data frame failed.
    #[error("handler for command 0x{command:02X} failed: {source}")]
    HandlerFailure {
        command: u8,
        #[source]
        source: HandlerError,
    },

    /// The flags did not name exactly one frame kind.
    #[error("malformed request: flags {0}")]
    MalformedRequest(OptionFlags),

    /// A HeartBeat or Echo reply could not be written.
    #[error("failed to write reply: {0}")]
    Write(#[source] io::Error),
}

/// What the read loop does after a request has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finish,
}

/// Read side of a connection as seen by the protocol.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Reads the next complete frame, rejecting payloads over
    /// `max_payload_len` bytes.
    async fn read_frame(&self, max_payload_len: u32) -> Result<Message, FrameError>;

    /// Address of the remote peer.
    fn peer_addr(&self) -> SocketAddr;
}

/// The protocol engine shared by every session of a server.
#[derive(Debug, Clone)]
pub struct Protocol {
    registry: HandlerRegistry,
    read_timeout: Duration,
    max_payload_len: u32,
}

impl Protocol {
    pub fn new(registry: HandlerRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            read_timeout: config.read_timeout,
            max_payload_len: config.max_payload_len,
        }
    }

    /// Builds the default protocol: command `0` injects key events.
    pub fn with_keyboard(injector: Arc<dyn KeyInjector>, config: &ServerConfig) -> Self {
        let mut registry = HandlerRegistry::new();
        KeyboardHandler::register(&mut registry, injector);
        Self::new(registry, config)
    }

    /// Serves one connection until it finishes.
    ///
    /// The read timeout restarts for every frame.  A read that loses the
    /// race is dropped, so no partially read frame is ever resumed.
    ///
    /// # Errors
    ///
    /// Returns `Ok(())` when the peer sends Fin and a [`SessionError`] for
    /// every other way the session can end.
    pub async fn serve<S>(&self, session: &S) -> Result<(), SessionError>
    where
        S: FrameSource + ReplySink,
    {
        loop {
            let read = session.read_frame(self.max_payload_len);
            let mut message = match tokio::time::timeout(self.read_timeout, read).await {
                Ok(frame) => frame?,
                Err(_) => return Err(SessionError::Timeout(self.read_timeout)),
            };
            message.origin = Some(session.peer_addr());
            debug!(
                peer = %session.peer_addr(),
                flags = %message.flags,
                command = message.command,
                len = message.content_length,
                "frame received"
            );

            if self.handle_request(&message, session).await? == Flow::Finish {
                return Ok(());
            }
        }
    }

    /// Classifies and acts on one decoded frame.
    ///
    /// # Errors
    ///
    /// See [`SessionError`]; every error is fatal to the session.
    pub async fn handle_request(
        &self,
        message: &Message,
        reply: &dyn ReplySink,
    ) -> Result<Flow, SessionError> {
        match message.kind() {
            Some(FrameKind::HeartBeat) | Some(FrameKind::Echo) => {
                reply
                    .send(&message.success_reply())
                    .await
                    .map_err(SessionError::Write)?;
                Ok(Flow::Continue)
            }
            Some(FrameKind::Fin) => Ok(Flow::Finish),
            Some(FrameKind::Data) => {
                let handler = self
                    .registry
                    .get(message.command)
                    .ok_or(SessionError::UnknownCommand(message.command))?;
                handler
                    .handle(message, reply)
                    .await
                    .map_err(|source| SessionError::HandlerFailure {
                        command: message.command,
                        source,
                    })?;
                Ok(Flow::Continue)
            }
            None => Err(SessionError::MalformedRequest(message.flags)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::CommandHandler;
    use crate::application::keyboard::MockKeyInjector;
    use mockall::predicate::eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use vboard_core::KeyEvent;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Replays a fixed list of read results, then stalls forever.
    #[derive(Default)]
    struct ScriptedConnection {
        frames: Mutex<VecDeque<Result<Message, FrameError>>>,
        sent: Mutex<Vec<Message>>,
        fail_writes: bool,
    }

    impl ScriptedConnection {
        fn with_frames(frames: Vec<Message>) -> Self {
            Self {
                frames: Mutex::new(frames.into_iter().map(Ok).collect()),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedConnection {
        async fn read_frame(&self, _max_payload_len: u32) -> Result<Message, FrameError> {
            let next = self.frames.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        fn peer_addr(&self) -> SocketAddr {
            "192.0.2.7:5000".parse().unwrap()
        }
    }

    #[async_trait]
    impl ReplySink for ScriptedConnection {
        async fn send(&self, message: &Message) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Records the messages it handles, including their origin.
    #[derive(Default)]
    struct CapturingHandler {
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl CommandHandler for CapturingHandler {
        async fn handle(&self, request: &Message, _: &dyn ReplySink) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            read_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        }
    }

    fn keyboard_protocol(injector: MockKeyInjector) -> Protocol {
        Protocol::with_keyboard(Arc::new(injector), &test_config())
    }

    // ── handle_request ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_heartbeat_is_acknowledged() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::default();

        let flow = protocol
            .handle_request(&Message::heartbeat(), &conn)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            conn.sent(),
            vec![Message::empty(OptionFlags::HEARTBEAT | OptionFlags::SUCCESS, 0)]
        );
    }

    #[tokio::test]
    async fn test_echo_reply_keeps_command_and_drops_payload() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::default();
        let request = Message::new(OptionFlags::ECHO, 0x33, b"hello".to_vec());

        let flow = protocol.handle_request(&request, &conn).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            conn.sent(),
            vec![Message::empty(OptionFlags::ECHO | OptionFlags::SUCCESS, 0x33)]
        );
    }

    #[tokio::test]
    async fn test_fin_finishes_without_reply() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::default();

        let flow = protocol.handle_request(&Message::fin(), &conn).await.unwrap();

        assert_eq!(flow, Flow::Finish);
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn test_data_without_handler_is_unknown_command() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::default();
        let request = Message::new(OptionFlags::DATA, 0x09, vec![1, 2]);

        let result = protocol.handle_request(&request, &conn).await;

        assert!(matches!(result, Err(SessionError::UnknownCommand(0x09))));
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_carries_command_id() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let request = Message::new(OptionFlags::DATA, 0, vec![0x41]);

        let result = protocol
            .handle_request(&request, &ScriptedConnection::default())
            .await;

        assert!(matches!(
            result,
            Err(SessionError::HandlerFailure {
                command: 0,
                source: HandlerError::InvalidPayload(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_unclassifiable_flags_are_malformed_requests() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::default();

        for bits in [0x00u8, 0x01, 0x30, 0x11, 0xA0, 0x02] {
            let request = Message::empty(OptionFlags(bits), 0);
            let result = protocol.handle_request(&request, &conn).await;
            assert!(
                matches!(result, Err(SessionError::MalformedRequest(f)) if f.bits() == bits),
                "flags {bits:#04x} must be rejected"
            );
        }
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reply_write_failure_is_write_error() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection {
            fail_writes: true,
            ..ScriptedConnection::default()
        };

        let result = protocol.handle_request(&Message::heartbeat(), &conn).await;

        assert!(matches!(result, Err(SessionError::Write(_))));
    }

    // ── serve ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_serve_processes_frames_in_order_until_fin() {
        // Arrange
        let mut injector = MockKeyInjector::new();
        injector
            .expect_inject()
            .with(eq(0x41), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        let protocol = keyboard_protocol(injector);
        let conn = ScriptedConnection::with_frames(vec![
            Message::heartbeat(),
            KeyEvent::release(0x41).to_message(),
            Message::empty(OptionFlags::ECHO, 0),
            Message::fin(),
            Message::heartbeat(),
        ]);

        // Act
        let result = protocol.serve(&conn).await;

        // Assert: three replies in request order, nothing after Fin
        assert!(result.is_ok());
        let flags: Vec<_> = conn.sent().iter().map(|m| m.flags).collect();
        assert_eq!(
            flags,
            vec![
                OptionFlags::HEARTBEAT | OptionFlags::SUCCESS,
                OptionFlags::DATA | OptionFlags::SUCCESS,
                OptionFlags::ECHO | OptionFlags::SUCCESS,
            ]
        );
    }

    #[tokio::test]
    async fn test_serve_stamps_origin_before_dispatch() {
        let handler = Arc::new(CapturingHandler::default());
        let mut registry = HandlerRegistry::new();
        registry.register(5, Arc::clone(&handler) as Arc<dyn CommandHandler>);
        let protocol = Protocol::new(registry, &test_config());
        let conn = ScriptedConnection::with_frames(vec![
            Message::new(OptionFlags::DATA, 5, vec![9]),
            Message::fin(),
        ]);

        protocol.serve(&conn).await.unwrap();

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, Some(conn.peer_addr()));
    }

    #[tokio::test]
    async fn test_serve_times_out_when_peer_is_silent() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::with_frames(vec![Message::heartbeat()]);

        let result = protocol.serve(&conn).await;

        assert!(matches!(result, Err(SessionError::Timeout(d)) if d == Duration::from_millis(100)));
        assert_eq!(conn.sent().len(), 1, "the heartbeat before the stall is answered");
    }

    #[tokio::test]
    async fn test_serve_stops_on_decode_error() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection {
            frames: Mutex::new(VecDeque::from([
                Err(FrameError::BadLeadingMagic(0x1234)),
                Ok(Message::heartbeat()),
            ])),
            ..ScriptedConnection::default()
        };

        let result = protocol.serve(&conn).await;

        assert!(matches!(
            result,
            Err(SessionError::MalformedFrame(FrameError::BadLeadingMagic(0x1234)))
        ));
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn test_serve_stops_on_unknown_command() {
        let protocol = keyboard_protocol(MockKeyInjector::new());
        let conn = ScriptedConnection::with_frames(vec![
            Message::new(OptionFlags::DATA, 0x42, vec![]),
            Message::heartbeat(),
        ]);

        let result = protocol.serve(&conn).await;

        assert!(matches!(result, Err(SessionError::UnknownCommand(0x42))));
        assert!(conn.sent().is_empty());
    }

    #[test]
    fn test_with_keyboard_takes_limits_from_config() {
        let config = ServerConfig {
            read_timeout: Duration::from_secs(3),
            max_payload_len: 128,
            ..ServerConfig::default()
        };

        let protocol = Protocol::with_keyboard(Arc::new(MockKeyInjector::new()), &config);

        assert_eq!(protocol.read_timeout, Duration::from_secs(3));
        assert_eq!(protocol.max_payload_len, 128);
        assert!(protocol.registry.get(0).is_some());
    }
}
