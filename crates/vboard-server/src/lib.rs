//! vboard-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/` and the
//! binary entry point in `main.rs` share the same module tree.
//!
//! # What does vboard-server do?
//!
//! It listens on a TCP port for long-lived control connections.  Each
//! connection speaks the framed protocol defined in `vboard-core`:
//!
//! 1. HeartBeat and Echo frames are acknowledged with a `SUCCESS` reply.
//! 2. Data frames are routed by command id to a registered handler.  The
//!    default table binds command `0` to a handler that presses or releases a
//!    key through a [`application::keyboard::KeyInjector`].
//! 3. A Fin frame ends the session gracefully.
//!
//! Anything else (bad magic, unknown command, silence longer than the read
//! timeout) drops the connection.  One bad connection never affects another.
//!
//! # Layers
//!
//! ```text
//! domain/          config, session ids (no I/O)
//! application/     protocol state machine, handler registry, keyboard handler
//! infrastructure/  sessions, connection manager, TCP accept loop, key injectors
//! ```

/// Domain layer: configuration and identifiers.
pub mod domain;

/// Application layer: protocol dispatch and command handlers.
pub mod application;

/// Infrastructure layer: sockets, sessions, and OS-facing adapters.
pub mod infrastructure;
