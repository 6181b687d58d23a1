//! Infrastructure layer for vboard-server.
//!
//! - [`framing`]: async read/write of whole frames over a byte stream.
//! - [`session`]: one connection with serialized I/O and idempotent close.
//! - [`manager`]: the live-session registry and coordinated shutdown.
//! - [`server`]: the TCP accept loop.
//! - [`key_injection`]: key injector implementations.

pub mod framing;
pub mod key_injection;
pub mod manager;
pub mod server;
pub mod session;

pub use manager::ConnectionManager;
pub use server::{Server, ServerError};
pub use session::Session;
