//! Frame model: the decoded [`Message`], its option flags, and the wire
//! constants shared by the encoder and the decoder.

use std::fmt;
use std::net::SocketAddr;
use std::ops::{BitOr, BitOrAssign};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Sentinel value that opens and closes every frame.
pub const MAGIC: u16 = 0xFFFF;

/// Size of the fixed frame header in bytes:
/// magic (2) + flags (1) + command (1) + content length (4).
pub const HEADER_SIZE: usize = 8;

/// Size of the trailing magic marker in bytes.
pub const TRAILER_SIZE: usize = 2;

/// Byte offset of the option flags inside the header.
pub const FLAGS_OFFSET: usize = 2;

/// Byte offset of the command id inside the header.
pub const COMMAND_OFFSET: usize = 3;

/// Byte offset of the big-endian content length inside the header.
pub const LENGTH_OFFSET: usize = 4;

// ── Option flags ──────────────────────────────────────────────────────────────

/// Bitfield classifying the purpose of a frame.
///
/// Bit assignments are fixed:
///
/// | Flag        | Bit | Value  |
/// |-------------|-----|--------|
/// | `HEARTBEAT` | 7   | `0x80` |
/// | `FIN`       | 6   | `0x40` |
/// | `ECHO`      | 5   | `0x20` |
/// | `DATA`      | 4   | `0x10` |
/// | `SUCCESS`   | 0   | `0x01` |
///
/// `SUCCESS` is only ever added to outgoing replies; it is not a
/// classification of its own.
///
/// # Examples
///
/// ```rust
/// use vboard_core::OptionFlags;
///
/// let reply = OptionFlags::HEARTBEAT | OptionFlags::SUCCESS;
/// assert!(reply.heartbeat());
/// assert!(reply.success());
/// assert_eq!(reply.bits(), 0x81);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OptionFlags(pub u8);

impl OptionFlags {
    pub const EMPTY: OptionFlags = OptionFlags(0);
    pub const HEARTBEAT: OptionFlags = OptionFlags(1 << 7);
    pub const FIN: OptionFlags = OptionFlags(1 << 6);
    pub const ECHO: OptionFlags = OptionFlags(1 << 5);
    pub const DATA: OptionFlags = OptionFlags(1 << 4);
    pub const SUCCESS: OptionFlags = OptionFlags(1 << 0);

    /// Returns the raw byte as it appears on the wire.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    pub fn contains(self, other: OptionFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn heartbeat(self) -> bool {
        self.contains(Self::HEARTBEAT)
    }

    pub fn fin(self) -> bool {
        self.contains(Self::FIN)
    }

    pub fn echo(self) -> bool {
        self.contains(Self::ECHO)
    }

    pub fn data(self) -> bool {
        self.contains(Self::DATA)
    }

    pub fn success(self) -> bool {
        self.contains(Self::SUCCESS)
    }

    /// Returns a copy with the `SUCCESS` marker added.
    pub fn with_success(self) -> OptionFlags {
        self | Self::SUCCESS
    }

    /// Returns `true` if the flags forbid a payload (HeartBeat or Fin set).
    pub fn requires_empty_payload(self) -> bool {
        self.heartbeat() || self.fin()
    }

    /// Classifies an inbound frame.
    ///
    /// Exactly one primary flag must be set and no other bit; any other
    /// combination (including an empty byte or a stray `SUCCESS`) yields
    /// `None`.
    pub fn kind(self) -> Option<FrameKind> {
        match self {
            Self::HEARTBEAT => Some(FrameKind::HeartBeat),
            Self::FIN => Some(FrameKind::Fin),
            Self::ECHO => Some(FrameKind::Echo),
            Self::DATA => Some(FrameKind::Data),
            _ => None,
        }
    }
}

impl BitOr for OptionFlags {
    type Output = OptionFlags;

    fn bitor(self, rhs: OptionFlags) -> OptionFlags {
        OptionFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OptionFlags {
    fn bitor_assign(&mut self, rhs: OptionFlags) {
        self.0 |= rhs.0;
    }
}

impl From<u8> for OptionFlags {
    fn from(value: u8) -> Self {
        OptionFlags(value)
    }
}

impl fmt::Display for OptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(OptionFlags, &str); 5] = [
            (OptionFlags::HEARTBEAT, "HEARTBEAT"),
            (OptionFlags::FIN, "FIN"),
            (OptionFlags::ECHO, "ECHO"),
            (OptionFlags::DATA, "DATA"),
            (OptionFlags::SUCCESS, "SUCCESS"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        write!(f, " ({:#04x})", self.0)
    }
}

/// Primary classification of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Keep-alive ping; answered with `HEARTBEAT | SUCCESS`.
    HeartBeat,
    /// Peer asks to end the session gracefully.
    Fin,
    /// Liveness check; answered with `ECHO | SUCCESS`.
    Echo,
    /// Command frame routed to a handler by its command id.
    Data,
}

// ── Header ────────────────────────────────────────────────────────────────────

/// The decoded 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: OptionFlags,
    pub command: u8,
    /// Declared payload length, not including the trailing magic.
    pub content_length: u32,
}

impl FrameHeader {
    /// Number of bytes that follow the header: payload plus trailing magic.
    pub fn body_len(&self) -> usize {
        self.content_length as usize + TRAILER_SIZE
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// One decoded frame.
///
/// `payload.len()` always equals `content_length` for messages built through
/// [`Message::new`] or produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub flags: OptionFlags,
    pub command: u8,
    pub content_length: u32,
    pub payload: Vec<u8>,
    /// Address of the peer that sent the frame.  The codec never fills this
    /// in; the server stamps it from the session after decoding.
    pub origin: Option<SocketAddr>,
}

impl Message {
    /// Creates a message whose declared length matches `payload`.
    ///
    /// A payload longer than `u32::MAX` bytes cannot be framed; its length is
    /// clamped here and the encoder rejects it.
    pub fn new(flags: OptionFlags, command: u8, payload: Vec<u8>) -> Self {
        let content_length = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            flags,
            command,
            content_length,
            payload,
            origin: None,
        }
    }

    /// Creates a message with no payload.
    pub fn empty(flags: OptionFlags, command: u8) -> Self {
        Self::new(flags, command, Vec::new())
    }

    pub fn heartbeat() -> Self {
        Self::empty(OptionFlags::HEARTBEAT, 0)
    }

    pub fn fin() -> Self {
        Self::empty(OptionFlags::FIN, 0)
    }

    /// Builds the reply acknowledging this message: same flags plus
    /// `SUCCESS`, same command id, empty payload.
    pub fn success_reply(&self) -> Self {
        Self::empty(self.flags.with_success(), self.command)
    }

    /// Returns the frame classification, if the flags carry exactly one.
    pub fn kind(&self) -> Option<FrameKind> {
        self.flags.kind()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
