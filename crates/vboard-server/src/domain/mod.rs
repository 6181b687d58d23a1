//! Domain layer for vboard-server.
//!
//! Pure types with no dependency on sockets or the async runtime: the runtime
//! configuration and the session identifier.

pub mod config;
pub mod session_id;

pub use config::{ConfigError, ConfigFile, ServerConfig};
pub use session_id::{SessionId, SessionIdGenerator};
