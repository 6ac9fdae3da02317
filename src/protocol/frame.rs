//! Outgoing WebSocket frames.
//!
//! A [`Frame`] is an opcode, a final flag and a payload. Payloads use
//! `bytes::Bytes` so frames can be queued and batched without copying.
//!
//! # Example
//!
//! ```
//! use ws_outgoing::protocol::{Frame, OpCode};
//!
//! let frame = Frame::text("hello");
//! assert_eq!(frame.op_code(), OpCode::Text);
//! assert!(frame.is_fin());
//! assert_eq!(frame.payload(), b"hello");
//! ```

use std::fmt;

use bytes::Bytes;

/// Defines how to interpret the payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a previous data frame.
    Continuation = 0x0,
    /// UTF-8 text.
    Text = 0x1,
    /// Opaque bytes.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Liveness check.
    Ping = 0x9,
    /// Response to a ping.
    Pong = 0xA,
}

impl OpCode {
    /// Data frames take part in message sequencing.
    #[inline]
    pub fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }

    /// Control frames may be interleaved with fragmented messages.
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Wire value of this opcode.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The message type this opcode starts, if any.
    #[inline]
    pub fn message_type(self) -> Option<MessageType> {
        match self {
            OpCode::Text => Some(MessageType::Text),
            OpCode::Binary => Some(MessageType::Binary),
            _ => None,
        }
    }
}

/// Kind of a logical (possibly fragmented) data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Text message.
    Text,
    /// Binary message.
    Binary,
}

impl MessageType {
    /// Opcode that starts a message of this type.
    #[inline]
    pub fn op_code(self) -> OpCode {
        match self {
            MessageType::Text => OpCode::Text,
            MessageType::Binary => OpCode::Binary,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => f.write_str("TEXT"),
            MessageType::Binary => f.write_str("BINARY"),
        }
    }
}

/// A single outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    op_code: OpCode,
    fin: bool,
    payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts.
    pub fn new(op_code: OpCode, fin: bool, payload: Bytes) -> Self {
        Self {
            op_code,
            fin,
            payload,
        }
    }

    /// Final TEXT frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpCode::Text, true, Bytes::from(text.into()))
    }

    /// Final BINARY frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, true, data.into())
    }

    /// CONTINUATION frame.
    pub fn continuation(data: impl Into<Bytes>, fin: bool) -> Self {
        Self::new(OpCode::Continuation, fin, data.into())
    }

    /// PING frame.
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, true, data.into())
    }

    /// PONG frame.
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, true, data.into())
    }

    /// CLOSE frame with an optional status code and reason.
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut buf = Vec::with_capacity(2 + reason.len());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(reason.as_bytes());
                Bytes::from(buf)
            }
            None => Bytes::new(),
        };
        Self::new(OpCode::Close, true, payload)
    }

    /// Builder-style final flag.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// See [`OpCode`].
    #[inline]
    pub fn op_code(&self) -> OpCode {
        self.op_code
    }

    /// Whether this is the last fragment of its message.
    #[inline]
    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// Whether this frame takes part in message sequencing.
    #[inline]
    pub fn is_data(&self) -> bool {
        self.op_code.is_data()
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_classes() {
        for op in [OpCode::Continuation, OpCode::Text, OpCode::Binary] {
            assert!(op.is_data());
            assert!(!op.is_control());
        }
        for op in [OpCode::Close, OpCode::Ping, OpCode::Pong] {
            assert!(op.is_control());
            assert!(!op.is_data());
        }
    }

    #[test]
    fn test_opcode_wire_values() {
        assert_eq!(OpCode::Text.as_u8(), 0x1);
        assert_eq!(OpCode::Pong.as_u8(), 0xA);
    }

    #[test]
    fn test_opcode_message_type() {
        assert_eq!(OpCode::Text.message_type(), Some(MessageType::Text));
        assert_eq!(OpCode::Binary.message_type(), Some(MessageType::Binary));
        assert_eq!(OpCode::Continuation.message_type(), None);
        assert_eq!(MessageType::Binary.op_code(), OpCode::Binary);
    }

    #[test]
    fn test_constructors() {
        let text = Frame::text("hi");
        assert_eq!(text.op_code(), OpCode::Text);
        assert!(text.is_fin());

        let partial = Frame::binary(vec![1u8, 2]).with_fin(false);
        assert!(!partial.is_fin());
        assert_eq!(partial.payload_len(), 2);

        let cont = Frame::continuation(Bytes::new(), true);
        assert_eq!(cont.op_code(), OpCode::Continuation);
        assert!(cont.is_data());
    }

    #[test]
    fn test_close_payload() {
        let frame = Frame::close(Some(1000), "bye");
        assert_eq!(frame.payload(), &[0x03, 0xE8, b'b', b'y', b'e']);
        assert!(Frame::close(None, "ignored").payload().is_empty());
    }
}
