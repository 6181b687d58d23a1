//! Command handler capability and the command-id registry.
//!
//! A handler is anything that can take a decoded Data frame and, optionally,
//! write replies back to the peer.  Handlers never see the session itself:
//! they only get a [`ReplySink`], so they cannot close or read from it.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use vboard_core::{Message, OptionFlags, PayloadError};

use crate::application::keyboard::InjectionError;

/// Error type returned by [`CommandHandler::handle`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload does not have the layout the command requires.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    /// The frame reached the handler without the flags it requires.
    #[error("command 0x{command:02X} received with unexpected flags {flags}")]
    UnexpectedFlags { command: u8, flags: OptionFlags },

    /// The collaborator the handler drives reported a failure.
    #[error("injection failed: {0}")]
    Injection(#[from] InjectionError),

    /// Writing the reply frame failed.
    #[error("failed to send reply: {0}")]
    Reply(#[source] io::Error),
}

/// Write side handed to handlers for their replies.
///
/// Each `send` writes one complete frame; concurrent senders on the same sink
/// never interleave bytes.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, message: &Message) -> io::Result<()>;
}

/// A handler bound to one command id.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles one Data frame.
    ///
    /// # Errors
    ///
    /// Any [`HandlerError`]; the caller ends the session on failure.
    async fn handle(&self, request: &Message, reply: &dyn ReplySink) -> Result<(), HandlerError>;
}

/// Maps command ids to their handlers.
///
/// Built once before the server starts and shared read-only by every session.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `command`, returning the handler it replaced.
    pub fn register(
        &mut self,
        command: u8,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.insert(command, handler)
    }

    pub fn get(&self, command: u8) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&command).cloned()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<_> = self.handlers.keys().copied().collect();
        commands.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("commands", &commands)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
