//! Command ids and the payload layouts of the built-in commands.

use thiserror::Error;

use crate::protocol::frame::{Message, OptionFlags};

/// Command id of the key-event command bound by default.
pub const KEY_EVENT: u8 = 0x00;

/// A payload had the wrong size for its command.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("command 0x{command:02X} expects a {expected}-byte payload, got {actual}")]
pub struct PayloadError {
    pub command: u8,
    pub expected: usize,
    pub actual: usize,
}

/// Payload of the [`KEY_EVENT`] command: `[key_code, up_flag]`.
///
/// A non-zero `up_flag` means the key is released; zero means it is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: u8,
    pub key_up: bool,
}

impl KeyEvent {
    pub const PAYLOAD_LEN: usize = 2;

    pub fn press(key_code: u8) -> Self {
        Self {
            key_code,
            key_up: false,
        }
    }

    pub fn release(key_code: u8) -> Self {
        Self {
            key_code,
            key_up: true,
        }
    }

    /// Parses a key-event payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] unless `payload` is exactly two bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vboard_core::KeyEvent;
    ///
    /// let event = KeyEvent::decode(&[0x41, 0x01]).unwrap();
    /// assert_eq!(event, KeyEvent::release(0x41));
    /// ```
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        match payload {
            [key_code, up_flag] => Ok(Self {
                key_code: *key_code,
                key_up: *up_flag != 0,
            }),
            _ => Err(PayloadError {
                command: KEY_EVENT,
                expected: Self::PAYLOAD_LEN,
                actual: payload.len(),
            }),
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        [self.key_code, u8::from(self.key_up)]
    }

    /// Wraps the event in a Data frame addressed to [`KEY_EVENT`].
    pub fn to_message(&self) -> Message {
        Message::new(OptionFlags::DATA, KEY_EVENT, self.encode().to_vec())
    }
}
