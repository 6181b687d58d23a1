//! Application layer for vboard-server.
//!
//! - [`protocol`]: the per-session state machine that classifies frames,
//!   answers control frames, and routes Data frames to handlers.
//! - [`handler`]: the [`handler::CommandHandler`] capability, the reply
//!   sink handlers write to, and the command-id registry.
//! - [`keyboard`]: the built-in key-event handler and the
//!   [`keyboard::KeyInjector`] trait it drives.
//!
//! Nothing here touches a socket directly; infrastructure types plug in
//! through the traits defined in this layer.

pub mod handler;
pub mod keyboard;
pub mod protocol;

pub use handler::{CommandHandler, HandlerError, HandlerRegistry, ReplySink};
pub use keyboard::{InjectionError, KeyInjector, KeyboardHandler};
pub use protocol::{Flow, FrameSource, Protocol, SessionError};
