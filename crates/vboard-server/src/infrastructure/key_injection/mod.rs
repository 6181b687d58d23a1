//! [`KeyInjector`](crate::application::keyboard::KeyInjector) implementations.
//!
//! The OS keyboard primitive is not linked into this crate.  The binary uses
//! [`TracingKeyInjector`], which logs each event; tests and embedders that
//! want to observe events use [`RecordingKeyInjector`].

pub mod mock;

pub use mock::RecordingKeyInjector;

use tracing::info;

use crate::application::keyboard::{InjectionError, KeyInjector};

/// Logs every key event at `info` level instead of touching the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingKeyInjector;

impl KeyInjector for TracingKeyInjector {
    fn inject(&self, key_code: u8, key_up: bool) -> Result<(), InjectionError> {
        let action = if key_up { "release" } else { "press" };
        info!(key_code, action, "key event");
        Ok(())
    }
}
