//! Recording key injector for tests.
//!
//! Each injected event is pushed into a `Mutex<Vec<...>>` so assertions can
//! inspect exactly what was injected and in what order, including from a
//! different task than the one that served the connection.
//!
//! Set `should_fail` to make every call return
//! [`InjectionError::Platform`], for exercising error paths.

use std::sync::Mutex;

use crate::application::keyboard::{InjectionError, KeyInjector};

/// A key injector that records calls without touching the OS.
#[derive(Debug, Default)]
pub struct RecordingKeyInjector {
    /// `(key_code, key_up)` for every call, in call order.
    pub events: Mutex<Vec<(u8, bool)>>,
    pub should_fail: bool,
}

impl RecordingKeyInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An injector whose every call fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<(u8, bool)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl KeyInjector for RecordingKeyInjector {
    fn inject(&self, key_code: u8, key_up: bool) -> Result<(), InjectionError> {
        if self.should_fail {
            return Err(InjectionError::Platform("mock failure".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| InjectionError::Platform("recording lock poisoned".to_string()))?
            .push((key_code, key_up));
        Ok(())
    }
}
