//! # vboard-core
//!
//! Shared protocol library for vboard, a small TCP control channel that lets a
//! remote peer press and release keys on the machine running the server.
//!
//! This crate has zero dependencies on OS APIs, async runtimes, or network
//! sockets.  It only knows how bytes are laid out on the wire.
//!
//! # Architecture overview
//!
//! Every exchange on the control channel is a *frame*:
//!
//! ```text
//! [FF FF][flags:1][command:1][content_length:4][payload:N][FF FF]
//! ```
//!
//! - **`protocol::frame`** – the decoded [`Message`], its [`OptionFlags`]
//!   bitfield, and the [`FrameKind`] classification used by the server's
//!   dispatch loop.
//!
//! - **`protocol::codec`** – turns a [`Message`] into bytes and back.  The
//!   decoder is split into a header step and a body step so that a streaming
//!   reader can learn how many bytes to wait for before it has them all.
//!
//! - **`protocol::command`** – the command id table and the payload layout of
//!   the built-in key-event command.

pub mod protocol;

pub use protocol::codec::{decode_body, decode_frame, decode_header, encode_frame, FrameError};
pub use protocol::command::{KeyEvent, PayloadError};
pub use protocol::frame::{FrameHeader, FrameKind, Message, OptionFlags};
