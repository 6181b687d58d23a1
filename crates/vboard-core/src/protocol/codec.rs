//! Binary codec for encoding and decoding vboard frames.
//!
//! Wire format:
//! ```text
//! [magic:2 = FF FF][flags:1][command:1][content_length:4][payload:N][magic:2 = FF FF]
//! ```
//! Header size: 8 bytes.  Trailer size: 2 bytes.  All multi-byte integers are
//! big-endian.  The command id and the content length occupy disjoint header
//! bytes (3 and 4..8 respectively).
//!
//! # Streaming decode
//!
//! A TCP reader does not know how long a frame is until it has seen the
//! header, so decoding is split in two steps:
//!
//! 1. [`decode_header`] – validates the leading magic and the flag/length
//!    rule, and reports how many more bytes the frame needs
//!    ([`FrameHeader::body_len`]).
//! 2. [`decode_body`] – validates the trailing magic and produces the
//!    [`Message`].
//!
//! [`decode_frame`] chains both steps for callers that already hold the whole
//! frame in memory.

use std::io;

use thiserror::Error;

use crate::protocol::frame::{
    FrameHeader, Message, OptionFlags, COMMAND_OFFSET, FLAGS_OFFSET, HEADER_SIZE, LENGTH_OFFSET,
    MAGIC, TRAILER_SIZE,
};

/// Reasons a byte sequence is not a valid frame.
///
/// Every variant is a malformed frame: the stream cannot be resynchronised
/// after any of them, so callers drop the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The first two bytes are not the magic marker.
    #[error("bad leading magic: 0x{0:04X}")]
    BadLeadingMagic(u16),

    /// The two bytes after the payload are not the magic marker.
    #[error("bad trailing magic: 0x{0:04X}")]
    BadTrailingMagic(u16),

    /// A HeartBeat or Fin frame declared a non-zero content length.
    #[error("{flags} frame must not carry a payload (declared {content_length} bytes)")]
    ControlFrameWithPayload {
        flags: OptionFlags,
        content_length: u32,
    },

    /// The buffer ends before the frame does.
    #[error("truncated frame: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The declared content length disagrees with the payload actually held.
    #[error("content length mismatch: declared {declared}, payload is {actual} bytes")]
    LengthMismatch { declared: u32, actual: usize },

    /// The declared content length exceeds the configured limit.
    #[error("payload of {declared} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { declared: u32, limit: u32 },

    /// The stream failed or hit end-of-file in the middle of a frame.
    #[error("short read: {kind}")]
    ShortRead { kind: io::ErrorKind },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into its full wire representation, trailer included.
///
/// The `origin` field is not part of the wire format and is ignored.
///
/// # Errors
///
/// Returns [`FrameError::LengthMismatch`] if `content_length` disagrees with
/// the payload, and [`FrameError::ControlFrameWithPayload`] for a HeartBeat or
/// Fin message that carries bytes.
///
/// # Examples
///
/// ```rust
/// use vboard_core::{decode_frame, encode_frame, Message, OptionFlags};
///
/// let msg = Message::new(OptionFlags::DATA, 0, vec![0x41, 0x01]);
/// let bytes = encode_frame(&msg).unwrap();
/// assert_eq!(
///     bytes,
///     [0xFF, 0xFF, 0x10, 0x00, 0x00, 0x00, 0x00, 0x02, 0x41, 0x01, 0xFF, 0xFF]
/// );
/// let (decoded, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameError> {
    if msg.payload.len() != msg.content_length as usize {
        return Err(FrameError::LengthMismatch {
            declared: msg.content_length,
            actual: msg.payload.len(),
        });
    }
    check_control_frame(msg.flags, msg.content_length)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + msg.payload.len() + TRAILER_SIZE);
    buf.extend_from_slice(&MAGIC.to_be_bytes());
    buf.push(msg.flags.bits());
    buf.push(msg.command);
    buf.extend_from_slice(&msg.content_length.to_be_bytes());
    buf.extend_from_slice(&msg.payload);
    buf.extend_from_slice(&MAGIC.to_be_bytes());
    Ok(buf)
}

/// Decodes the 8-byte frame header at the start of `bytes`.
///
/// Only the first [`HEADER_SIZE`] bytes are inspected.
///
/// # Errors
///
/// - [`FrameError::Truncated`] if fewer than 8 bytes are available.
/// - [`FrameError::BadLeadingMagic`] if the frame does not open with `FF FF`.
/// - [`FrameError::ControlFrameWithPayload`] if HeartBeat or Fin is set and the
///   content length is not zero.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
    if magic != MAGIC {
        return Err(FrameError::BadLeadingMagic(magic));
    }

    let flags = OptionFlags(bytes[FLAGS_OFFSET]);
    let command = bytes[COMMAND_OFFSET];
    let content_length = u32::from_be_bytes([
        bytes[LENGTH_OFFSET],
        bytes[LENGTH_OFFSET + 1],
        bytes[LENGTH_OFFSET + 2],
        bytes[LENGTH_OFFSET + 3],
    ]);
    check_control_frame(flags, content_length)?;

    Ok(FrameHeader {
        flags,
        command,
        content_length,
    })
}

/// Decodes the bytes that follow a header: the payload and the trailing magic.
///
/// `body` must be exactly [`FrameHeader::body_len`] bytes long.
///
/// # Errors
///
/// - [`FrameError::Truncated`] if `body` has the wrong length.
/// - [`FrameError::BadTrailingMagic`] if the frame does not close with `FF FF`.
pub fn decode_body(header: &FrameHeader, body: &[u8]) -> Result<Message, FrameError> {
    let needed = header.body_len();
    if body.len() != needed {
        return Err(FrameError::Truncated {
            needed,
            available: body.len(),
        });
    }

    let (payload, trailer) = body.split_at(needed - TRAILER_SIZE);
    let magic = u16::from_be_bytes([trailer[0], trailer[1]]);
    if magic != MAGIC {
        return Err(FrameError::BadTrailingMagic(magic));
    }

    Ok(Message {
        flags: header.flags,
        command: header.command,
        content_length: header.content_length,
        payload: payload.to_vec(),
        origin: None,
    })
}

/// Decodes one complete frame from the beginning of `bytes`.
///
/// Returns the message and the number of bytes consumed so the caller can
/// advance its cursor past the frame.
///
/// # Errors
///
/// Any [`FrameError`] from [`decode_header`] or [`decode_body`];
/// [`FrameError::Truncated`] if `bytes` ends before the trailer.
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameError> {
    let header = decode_header(bytes)?;
    let total = HEADER_SIZE + header.body_len();
    if bytes.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            available: bytes.len(),
        });
    }
    let msg = decode_body(&header, &bytes[HEADER_SIZE..total])?;
    Ok((msg, total))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn check_control_frame(flags: OptionFlags, content_length: u32) -> Result<(), FrameError> {
    if flags.requires_empty_payload() && content_length > 0 {
        return Err(FrameError::ControlFrameWithPayload {
            flags,
            content_length,
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let bytes = encode_frame(msg).expect("encode");
        let (decoded, consumed) = decode_frame(&bytes).expect("decode");
        assert_eq!(consumed, bytes.len(), "all bytes must be consumed");
        decoded
    }

    // ── Encoding layout ──────────────────────────────────────────────────────

    #[test]
    fn test_encode_heartbeat_layout() {
        let bytes = encode_frame(&Message::heartbeat()).unwrap();
        assert_eq!(bytes, [0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_places_command_and_length_in_disjoint_bytes() {
        let msg = Message::new(OptionFlags::DATA, 0xAB, vec![0u8; 0x0102]);
        let bytes = encode_frame(&msg).unwrap();
        assert_eq!(bytes[COMMAND_OFFSET], 0xAB);
        assert_eq!(&bytes[LENGTH_OFFSET..HEADER_SIZE], &[0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_encode_always_appends_trailer() {
        let msg = Message::new(OptionFlags::ECHO, 1, vec![1, 2, 3]);
        let bytes = encode_frame(&msg).unwrap();
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xFF]);
        assert_eq!(bytes.len(), HEADER_SIZE + 3 + TRAILER_SIZE);
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        let mut msg = Message::new(OptionFlags::DATA, 0, vec![1, 2]);
        msg.content_length = 5;
        assert_eq!(
            encode_frame(&msg),
            Err(FrameError::LengthMismatch {
                declared: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn test_encode_rejects_fin_with_payload() {
        let msg = Message::new(OptionFlags::FIN, 0, vec![1]);
        assert!(matches!(
            encode_frame(&msg),
            Err(FrameError::ControlFrameWithPayload { .. })
        ));
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_data_frame_round_trip() {
        let msg = Message::new(OptionFlags::DATA, 0, vec![0x41, 0x01]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_echo_with_large_payload_round_trip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let msg = Message::new(OptionFlags::ECHO, 0x7F, payload);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_payload_containing_magic_bytes_round_trip() {
        let msg = Message::new(OptionFlags::DATA, 3, vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Header validation ────────────────────────────────────────────────────

    #[test]
    fn test_decode_header_rejects_short_buffer() {
        assert_eq!(
            decode_header(&[0xFF, 0xFF, 0x80]),
            Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_header_rejects_bad_leading_magic() {
        let bytes = [0xFF, 0xFE, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(decode_header(&bytes), Err(FrameError::BadLeadingMagic(0xFFFE)));
    }

    #[test]
    fn test_decode_header_rejects_heartbeat_with_length() {
        let bytes = [0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            decode_header(&bytes),
            Err(FrameError::ControlFrameWithPayload {
                flags: OptionFlags::HEARTBEAT,
                content_length: 1
            })
        );
    }

    #[test]
    fn test_decode_header_rejects_fin_combined_with_other_flags_and_length() {
        let bytes = [0xFF, 0xFF, 0x50, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert!(matches!(
            decode_header(&bytes),
            Err(FrameError::ControlFrameWithPayload { .. })
        ));
    }

    #[test]
    fn test_decode_header_reads_command_from_byte_three() {
        let bytes = [0xFF, 0xFF, 0x10, 0x05, 0x00, 0x00, 0x00, 0x02];
        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.command, 0x05);
        assert_eq!(header.content_length, 2);
        assert_eq!(header.flags, OptionFlags::DATA);
    }

    // ── Body validation ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_body_rejects_bad_trailing_magic() {
        let header = FrameHeader {
            flags: OptionFlags::DATA,
            command: 0,
            content_length: 2,
        };
        assert_eq!(
            decode_body(&header, &[0x41, 0x01, 0xFF, 0x00]),
            Err(FrameError::BadTrailingMagic(0xFF00))
        );
    }

    #[test]
    fn test_decode_body_rejects_wrong_length() {
        let header = FrameHeader {
            flags: OptionFlags::DATA,
            command: 0,
            content_length: 2,
        };
        assert_eq!(
            decode_body(&header, &[0x41, 0xFF, 0xFF]),
            Err(FrameError::Truncated {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_frame_rejects_missing_trailer() {
        let bytes = [0xFF, 0xFF, 0x10, 0x00, 0x00, 0x00, 0x00, 0x02, 0x41, 0x01];
        assert!(matches!(decode_frame(&bytes), Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn test_decode_frame_ignores_trailing_bytes_of_next_frame() {
        let mut bytes = encode_frame(&Message::heartbeat()).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode_frame(&Message::fin()).unwrap());

        let (msg, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!(msg, Message::heartbeat());
        assert_eq!(consumed, first_len);
    }
}
