//! RFC 6455 frame header encoding.
//!
//! ```text
//! ┌───┬──────┬────────┬───┬─────────┬──────────────────┬──────────────┐
//! │FIN│ RSV  │ opcode │ M │ len (7) │ ext len (0/2/8)  │ mask key 0/4 │
//! │ 1 │ 3    │ 4 bits │ 1 │ 7 bits  │ uint16/64 BE     │              │
//! └───┴──────┴────────┴───┴─────────┴──────────────────┴──────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use super::frame::Frame;

/// Maximum header size in bytes (2 + 8 extended length + 4 mask).
pub const MAX_HEADER_SIZE: usize = 14;

/// Control frame payloads may not exceed this many bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0b1000_0000;
const MASK_BIT: u8 = 0b1000_0000;

/// An encoded header plus its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedHeader {
    buf: [u8; MAX_HEADER_SIZE],
    len: u8,
}

impl EncodedHeader {
    /// Header bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    /// Header length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Headers are never empty; provided for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encode the header of `frame`, optionally masked with `mask`.
///
/// # Example
///
/// ```
/// use ws_outgoing::protocol::{encode_header, Frame};
///
/// let header = encode_header(&Frame::text("hi"), None);
/// assert_eq!(header.as_bytes(), &[0x81, 0x02]);
/// ```
pub fn encode_header(frame: &Frame, mask: Option<[u8; 4]>) -> EncodedHeader {
    let mut buf = [0u8; MAX_HEADER_SIZE];
    let mut first = frame.op_code().as_u8();
    if frame.is_fin() {
        first |= FIN_BIT;
    }
    buf[0] = first;

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    let payload_len = frame.payload_len();
    let mut len = if payload_len < 126 {
        buf[1] = mask_bit | payload_len as u8;
        2
    } else if payload_len <= u16::MAX as usize {
        buf[1] = mask_bit | 126;
        buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        buf[1] = mask_bit | 127;
        buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        10
    };

    if let Some(key) = mask {
        buf[len..len + 4].copy_from_slice(&key);
        len += 4;
    }

    EncodedHeader {
        buf,
        len: len as u8,
    }
}

/// XOR `payload` in place with the masking key.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
