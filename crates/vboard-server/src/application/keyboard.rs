//! Built-in key-event command handler.
//!
//! Command [`KEY_EVENT`] carries a two-byte payload `[key_code, up_flag]`.
//! The handler decodes it, hands the event to a [`KeyInjector`], and
//! acknowledges with an empty `DATA | SUCCESS` frame.  The OS-level injection
//! primitive lives behind the trait so the handler is testable without a
//! desktop session.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use vboard_core::protocol::command::KEY_EVENT;
use vboard_core::{FrameKind, KeyEvent, Message};

use crate::application::handler::{CommandHandler, HandlerError, HandlerRegistry, ReplySink};

/// Error type for key injection.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("platform error: {0}")]
    Platform(String),
}

/// Synthesizes one key press or release on the host.
///
/// Implementations live in the infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait KeyInjector: Send + Sync {
    /// Presses (`key_up == false`) or releases (`key_up == true`) `key_code`.
    fn inject(&self, key_code: u8, key_up: bool) -> Result<(), InjectionError>;
}

/// Handler for [`KEY_EVENT`].
pub struct KeyboardHandler {
    injector: Arc<dyn KeyInjector>,
}

impl KeyboardHandler {
    pub fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self { injector }
    }

    /// Registers a keyboard handler for [`KEY_EVENT`] in `registry`.
    pub fn register(registry: &mut HandlerRegistry, injector: Arc<dyn KeyInjector>) {
        registry.register(KEY_EVENT, Arc::new(Self::new(injector)));
    }
}

#[async_trait]
impl CommandHandler for KeyboardHandler {
    async fn handle(&self, request: &Message, reply: &dyn ReplySink) -> Result<(), HandlerError> {
        if request.kind() != Some(FrameKind::Data) {
            return Err(HandlerError::UnexpectedFlags {
                command: request.command,
                flags: request.flags,
            });
        }

        let event = KeyEvent::decode(&request.payload)?;
        debug!(
            key_code = event.key_code,
            key_up = event.key_up,
            origin = ?request.origin,
            "injecting key event"
        );
        self.injector.inject(event.key_code, event.key_up)?;

        reply
            .send(&request.success_reply())
            .await
            .map_err(HandlerError::Reply)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
