//! Session identifiers and the lock-free generator that hands them out.
//!
//! Identifiers are unique for the lifetime of the process: the generator is a
//! single `AtomicU64`, so concurrent accepts can never observe the same value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A thread-safe, monotonically increasing source of [`SessionId`]s.
///
/// The first identifier is `1`.
///
/// # Examples
///
/// ```rust
/// use vboard_server::domain::{SessionId, SessionIdGenerator};
///
/// let ids = SessionIdGenerator::new();
/// assert_eq!(ids.next_id(), SessionId(1));
/// assert_eq!(ids.next_id(), SessionId(2));
/// ```
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    last: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh identifier.
    ///
    /// `Relaxed` is enough: uniqueness comes from the atomicity of
    /// `fetch_add`, and no other memory is published through the counter.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
