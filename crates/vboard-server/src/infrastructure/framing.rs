//! Async frame I/O over any tokio byte stream.
//!
//! Reading is done in two `read_exact` steps: the fixed 8-byte header first,
//! then exactly `content_length + 2` bytes of payload and trailer.  TCP may
//! deliver a frame in any number of fragments; `read_exact` loops until each
//! step is complete.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vboard_core::protocol::frame::HEADER_SIZE;
use vboard_core::{decode_body, decode_header, encode_frame, FrameError, Message};

/// Reads one complete frame from `reader`.
///
/// # Errors
///
/// - [`FrameError::ShortRead`] if the stream fails or ends inside the frame.
/// - [`FrameError::PayloadTooLarge`] if the header declares more than
///   `max_payload_len` bytes; nothing past the header is read.
/// - Any header or trailer error from the codec.
pub async fn read_frame<R>(reader: &mut R, max_payload_len: u32) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await.map_err(short_read)?;
    let header = decode_header(&header_buf)?;

    if header.content_length > max_payload_len {
        return Err(FrameError::PayloadTooLarge {
            declared: header.content_length,
            limit: max_payload_len,
        });
    }

    let mut body = vec![0u8; header.body_len()];
    reader.read_exact(&mut body).await.map_err(short_read)?;
    decode_body(&header, &body)
}

/// Encodes `message` and writes it to `writer` in one `write_all`, then
/// flushes.
///
/// # Errors
///
/// Returns `InvalidInput` if the message cannot be framed, otherwise any I/O
/// error from the writer.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes =
        encode_frame(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn short_read(err: io::Error) -> FrameError {
    FrameError::ShortRead { kind: err.kind() }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
