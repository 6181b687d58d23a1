//! One accepted connection.
//!
//! The stream is split into independent read and write halves, each behind
//! its own async mutex, so a blocked read never delays a reply and
//! concurrent writers never interleave frames.
//!
//! # Closing
//!
//! [`Session::close`] may be called any number of times from any number of
//! tasks.  The first call flips the closed flag, cancels every in-flight read
//! or write (they return `NotConnected`), and shuts the write half down
//! exactly once.  Every caller returns only after that has finished.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vboard_core::{FrameError, Message};

use crate::application::handler::ReplySink;
use crate::application::protocol::FrameSource;
use crate::domain::SessionId;
use crate::infrastructure::framing;

/// Any duplex byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedTransport = Box<dyn Transport>;

/// A live connection with serialized reads, serialized writes, and an
/// idempotent close.
pub struct Session {
    id: SessionId,
    remote_addr: SocketAddr,
    reader: Mutex<ReadHalf<BoxedTransport>>,
    writer: Mutex<WriteHalf<BoxedTransport>>,
    closed: AtomicBool,
    close_gate: OnceCell<()>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new<T: Transport>(id: SessionId, stream: T, remote_addr: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(Box::new(stream) as BoxedTransport);
        Self {
            id,
            remote_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            close_gate: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once [`Session::close`] has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Reads raw bytes, returning how many were read (`0` at end of stream).
    ///
    /// # Errors
    ///
    /// `NotConnected` if the session is or becomes closed, otherwise any
    /// error from the stream.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.guarded(self.reader.lock()).await?;
        self.guarded(reader.read(buf)).await?
    }

    /// Reads one complete frame.
    ///
    /// # Errors
    ///
    /// See [`framing::read_frame`].  Closing the session mid-read yields
    /// [`FrameError::ShortRead`] with kind `NotConnected`.
    pub async fn read_frame(&self, max_payload_len: u32) -> Result<Message, FrameError> {
        let outcome = async {
            let mut reader = self.guarded(self.reader.lock()).await?;
            self.guarded(framing::read_frame(&mut *reader, max_payload_len))
                .await
        };
        match outcome.await {
            Ok(frame) => frame,
            Err(err) => Err(FrameError::ShortRead { kind: err.kind() }),
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Writes all of `buf` and flushes.
    ///
    /// # Errors
    ///
    /// `NotConnected` if the session is or becomes closed, otherwise any
    /// error from the stream.
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self.guarded(self.writer.lock()).await?;
        self.guarded(async {
            writer.write_all(buf).await?;
            writer.flush().await
        })
        .await?
    }

    /// Writes one complete frame.
    ///
    /// # Errors
    ///
    /// As [`Session::write_all`], plus `InvalidInput` for a message that
    /// cannot be framed.
    pub async fn send(&self, message: &Message) -> io::Result<()> {
        let mut writer = self.guarded(self.writer.lock()).await?;
        self.guarded(framing::write_frame(&mut *writer, message))
            .await?
    }

    /// Copies everything from `source` into the stream while holding the write
    /// lock, so no frame can be interleaved with the copy.
    ///
    /// # Errors
    ///
    /// As [`Session::write_all`], plus any error from `source`.
    pub async fn copy_from<R>(&self, source: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut writer = self.guarded(self.writer.lock()).await?;
        self.guarded(async {
            let copied = tokio::io::copy(source, &mut *writer).await?;
            writer.flush().await?;
            Ok::<_, io::Error>(copied)
        })
        .await?
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Closes the session.
    ///
    /// Returns `true` for the one call that moved the session from open to
    /// closed.  All callers wait until the write half has been shut down.
    pub async fn close(&self) -> bool {
        let first = self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        self.close_gate
            .get_or_init(|| async {
                self.cancel.cancel();
                let mut writer = self.writer.lock().await;
                if let Err(err) = writer.shutdown().await {
                    debug!(session = %self.id, error = %err, "shutdown of write half failed");
                }
                debug!(session = %self.id, peer = %self.remote_addr, "session closed");
            })
            .await;

        first
    }

    /// Runs `fut` unless the session is closed first.
    async fn guarded<F>(&self, fut: F) -> io::Result<F::Output>
    where
        F: std::future::Future,
    {
        if self.is_closed() {
            return Err(not_connected());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(not_connected()),
            out = fut => Ok(out),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session closed")
}

#[async_trait]
impl ReplySink for Session {
    async fn send(&self, message: &Message) -> io::Result<()> {
        Session::send(self, message).await
    }
}

#[async_trait]
impl FrameSource for Session {
    async fn read_frame(&self, max_payload_len: u32) -> Result<Message, FrameError> {
        Session::read_frame(self, max_payload_len).await
    }

    fn peer_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
