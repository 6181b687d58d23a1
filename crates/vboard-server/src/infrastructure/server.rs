//! TCP accept loop and per-session task management.
//!
//! [`Server::run`] accepts connections until [`Server::shutdown`] is called.
//! Each accepted connection becomes a [`Session`], is registered with the
//! [`ConnectionManager`], and is served by its own Tokio task so one slow or
//! hostile peer never blocks the others.
//!
//! Whatever way a session task ends (Fin, timeout, malformed frame, handler
//! failure, shutdown) it closes its session and deregisters it, which is what
//! lets [`ConnectionManager::shutdown`] drain.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::protocol::Protocol;
use crate::domain::config::ServerConfig;
use crate::domain::SessionId;
use crate::infrastructure::manager::ConnectionManager;
use crate::infrastructure::session::Session;

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("the accept loop is already running or has finished")]
    AlreadyRunning,
}

/// A bound control-channel server.
pub struct Server {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    protocol: Arc<Protocol>,
    manager: Arc<ConnectionManager>,
    stop: CancellationToken,
}

impl Server {
    /// Binds the listening socket.  No connection is accepted until
    /// [`Server::run`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &ServerConfig, protocol: Protocol) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        };
        let listener = TcpListener::bind(config.bind_addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            protocol: Arc::new(protocol),
            manager: Arc::new(ConnectionManager::new()),
            stop: CancellationToken::new(),
        })
    }

    /// The address actually bound; differs from the configured one when port
    /// `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub async fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.manager.get_session(id).await
    }

    pub async fn session_count(&self) -> usize {
        self.manager.session_count().await
    }

    /// Runs the accept loop until [`Server::shutdown`] is called.
    ///
    /// Returning `Ok(())` means the listener was closed on request; it is not
    /// a failure.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if the loop was started before.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or(ServerError::AlreadyRunning)?;

        info!(addr = %self.local_addr, "vboard server listening");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer).await,
                    Err(e) => {
                        error!(error = %e, "accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        info!(addr = %self.local_addr, "listener closed");
        Ok(())
    }

    /// Stops accepting, closes every session, and waits for them to drain.
    ///
    /// Returns `true` for the call that performed the teardown.
    pub async fn shutdown(&self) -> bool {
        self.stop.cancel();
        self.manager.shutdown().await
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not set TCP_NODELAY");
        }

        let session = Arc::new(Session::new(self.manager.next_session_id(), stream, peer));
        if !self.manager.put_session(Arc::clone(&session)).await {
            debug!(%peer, "connection refused: server is shutting down");
            return;
        }
        info!(session = %session.id(), %peer, "session opened");

        let protocol = Arc::clone(&self.protocol);
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move {
            run_session(protocol, manager, session).await;
        });
    }
}

/// Serves one session to completion, then closes and deregisters it.
///
/// The protocol loop runs on its own task so that a panicking handler ends
/// only that task; the session is still closed and deregistered here.
async fn run_session(
    protocol: Arc<Protocol>,
    manager: Arc<ConnectionManager>,
    session: Arc<Session>,
) {
    let id = session.id();
    let serving = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { protocol.serve(session.as_ref()).await })
    };

    match serving.await {
        Ok(Ok(())) => info!(session = %id, "peer finished the session"),
        Ok(Err(e)) if session.is_closed() => {
            debug!(session = %id, error = %e, "session closed locally")
        }
        Ok(Err(e)) => warn!(session = %id, error = %e, "session terminated"),
        Err(e) if e.is_panic() => error!(session = %id, "session task panicked"),
        Err(e) => warn!(session = %id, error = %e, "session task aborted"),
    }

    session.close().await;
    manager.del_session(&session).await;
    debug!(session = %id, "session deregistered");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
