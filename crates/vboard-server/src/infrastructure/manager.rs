//! ConnectionManager: registry of live sessions and coordinated shutdown.
//!
//! The manager owns three pieces of shared state:
//!
//! - the session map, guarded by an async `RwLock`,
//! - the closed flag (stored in the same lock, so registration and shutdown
//!   cannot race),
//! - an outstanding-session counter published through a `watch` channel.
//!
//! Every successful [`ConnectionManager::put_session`] raises the counter by
//! one and the matching [`ConnectionManager::del_session`] lowers it by one.
//! [`ConnectionManager::shutdown`] closes every session and waits for the
//! counter to reach zero, i.e. for every session's owner task to deregister.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};

use crate::domain::{SessionId, SessionIdGenerator};
use crate::infrastructure::session::Session;

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Arc<Session>>,
    closed: bool,
}

/// Tracks live sessions and coordinates their teardown.
pub struct ConnectionManager {
    registry: RwLock<Registry>,
    ids: SessionIdGenerator,
    outstanding: watch::Sender<usize>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            registry: RwLock::new(Registry::default()),
            ids: SessionIdGenerator::new(),
            outstanding,
        }
    }

    /// Allocates an identifier that no other session of this process has used.
    pub fn next_session_id(&self) -> SessionId {
        self.ids.next_id()
    }

    /// Registers `session`.
    ///
    /// Returns `false` if the manager is shutting down or another session
    /// already holds the same id; `session` is then closed and not
    /// registered, and the one already registered is left untouched.
    pub async fn put_session(&self, session: Arc<Session>) -> bool {
        let reason = {
            let mut registry = self.registry.write().await;
            if registry.closed {
                "manager is shut down"
            } else if registry.sessions.contains_key(&session.id()) {
                "session id already registered"
            } else {
                registry.sessions.insert(session.id(), Arc::clone(&session));
                self.outstanding.send_modify(|n| *n += 1);
                return true;
            }
        };

        debug!(session = %session.id(), reason, "rejecting session");
        session.close().await;
        false
    }

    pub async fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.registry.read().await.sessions.get(&id).cloned()
    }

    /// Deregisters `session`.
    ///
    /// Returns `true` if it was registered.  Removing a session that is not
    /// registered, including a second removal, changes nothing.
    pub async fn del_session(&self, session: &Session) -> bool {
        let removed = self
            .registry
            .write()
            .await
            .sessions
            .remove(&session.id())
            .is_some();
        if removed {
            self.outstanding.send_modify(|n| *n -= 1);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.registry.read().await.closed
    }

    /// Closes every live session, refuses new ones, and waits until all
    /// registered sessions have been deregistered.
    ///
    /// Safe to call concurrently and repeatedly.  The teardown runs once;
    /// the return value is `true` only for the call that ran it.  Every call
    /// returns after the last session has been deregistered.
    ///
    /// The close sweep runs on its own task, so dropping the call that
    /// started it (e.g. on a timeout) still closes every session.
    pub async fn shutdown(&self) -> bool {
        let snapshot = {
            let mut registry = self.registry.write().await;
            if registry.closed {
                None
            } else {
                registry.closed = true;
                Some(registry.sessions.values().cloned().collect::<Vec<_>>())
            }
        };

        let ran_teardown = snapshot.is_some();
        if let Some(sessions) = snapshot {
            info!(sessions = sessions.len(), "shutting down connection manager");
            let sweep = tokio::spawn(async move {
                for session in sessions {
                    session.close().await;
                }
            });
            if let Err(e) = sweep.await {
                error!(error = %e, "session close sweep failed");
            }
        }

        let mut outstanding = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = outstanding.wait_for(|n| *n == 0).await;

        if ran_teardown {
            info!("all sessions drained");
        }
        ran_teardown
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
