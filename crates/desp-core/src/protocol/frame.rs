//! Frame codec shared by the multicast session and the subnet scanner.
//!
//! Wire format (one UDP datagram payload):
//! ```text
//! [magic:4 = "DESP"][payload:N]
//! ```
//! A payload of exactly `!ping` or `!pong` is a control command; anything
//! else (including an empty payload) is application data.  There is no length
//! field and no escaping, so an application payload that happens to equal a
//! control string cannot be told apart from real control traffic.

use thiserror::Error;

/// Fixed tag that opens every frame.
pub const MAGIC: &[u8; 4] = b"DESP";

/// Length of a control command (`!ping` / `!pong`).
pub const CONTROL_LEN: usize = 5;

/// Length of a complete control frame: magic + command.
pub const CONTROL_FRAME_LEN: usize = MAGIC.len() + CONTROL_LEN;

const PING: &[u8; CONTROL_LEN] = b"!ping";
const PONG: &[u8; CONTROL_LEN] = b"!pong";

/// Reasons a datagram is not a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The datagram cannot even hold the magic tag.
    #[error("datagram too short for a frame: {len} bytes")]
    TooShort { len: usize },

    /// The first four bytes are not the magic tag.
    #[error("datagram does not start with the frame tag")]
    BadMagic,
}

/// Liveness control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Ping,
    Pong,
}

impl Control {
    /// The command bytes carried after the magic tag.
    pub fn as_bytes(self) -> &'static [u8; CONTROL_LEN] {
        match self {
            Control::Ping => PING,
            Control::Pong => PONG,
        }
    }

    /// Recognises a payload that is exactly one control command.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            p if p == PING => Some(Control::Ping),
            p if p == PONG => Some(Control::Pong),
            _ => None,
        }
    }

    /// Builds the complete 9-byte control frame.
    pub fn to_frame(self) -> [u8; CONTROL_FRAME_LEN] {
        let mut frame = [0u8; CONTROL_FRAME_LEN];
        frame[..MAGIC.len()].copy_from_slice(MAGIC);
        frame[MAGIC.len()..].copy_from_slice(self.as_bytes());
        frame
    }
}

/// A decoded frame, borrowing its payload from the datagram buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Control(Control),
    Message(&'a [u8]),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Prepends the magic tag to `payload`.
///
/// # Examples
///
/// ```rust
/// use desp_core::protocol::encode_frame;
///
/// assert_eq!(encode_frame(b"hi"), b"DESPhi".to_vec());
/// ```
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAGIC.len() + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(payload);
    buf
}

/// Validates the magic tag and returns the bytes that follow it.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] for datagrams under four bytes and
/// [`FrameError::BadMagic`] when the tag does not match.
pub fn strip_magic(bytes: &[u8]) -> Result<&[u8], FrameError> {
    if bytes.len() < MAGIC.len() {
        return Err(FrameError::TooShort { len: bytes.len() });
    }
    let (tag, payload) = bytes.split_at(MAGIC.len());
    if tag != MAGIC {
        return Err(FrameError::BadMagic);
    }
    Ok(payload)
}

/// Decodes a datagram into a control or application [`Frame`].
///
/// # Errors
///
/// Same as [`strip_magic`]: the datagram is not a frame.
///
/// # Examples
///
/// ```rust
/// use desp_core::protocol::{decode_frame, Control, Frame};
///
/// assert_eq!(decode_frame(b"DESP!ping").unwrap(), Frame::Control(Control::Ping));
/// assert_eq!(decode_frame(b"DESPhello").unwrap(), Frame::Message(b"hello"));
/// assert!(decode_frame(b"nope").is_err());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    let payload = strip_magic(bytes)?;
    Ok(match Control::parse(payload) {
        Some(control) => Frame::Control(control),
        None => Frame::Message(payload),
    })
}

/// Returns `true` only for exactly the 9-byte `DESP!pong` frame.
pub fn is_pong_frame(bytes: &[u8]) -> bool {
    bytes == Control::Pong.to_frame()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
