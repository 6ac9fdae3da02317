//! Error types for ws-outgoing.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{MessageType, OpCode};

/// Main error type for all send-side operations.
///
/// Cloneable so a single failure can be reported both to a completion
/// callback and through a method's return value.
#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Missing payload, missing encoder, or an otherwise unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The frame would violate the WebSocket framing rules.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// An encoder failed to turn an application value into a message.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// I/O error while writing frames.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The connection (or the writer serving it) is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Write queue full.
    #[error("Backpressure limit reached")]
    Backpressure,

    /// Anything outside the declared categories; indicates a defect.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl From<std::io::Error> for WsError {
    fn from(err: std::io::Error) -> Self {
        WsError::Io(Arc::new(err))
    }
}

/// Broad category of a [`WsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller passed something unusable.
    InvalidArgument,
    /// Framing rules would be broken.
    Protocol,
    /// Application value could not be encoded.
    Encode,
    /// The frame could not be written.
    Transport,
    /// Defect class.
    Unexpected,
}

impl WsError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WsError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            WsError::Protocol(_) => ErrorKind::Protocol,
            WsError::Encode(_) => ErrorKind::Encode,
            WsError::Io(_) | WsError::ConnectionClosed | WsError::Backpressure => {
                ErrorKind::Transport
            }
            WsError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether this is a normal failure path rather than a defect.
    #[inline]
    pub fn is_declared(&self) -> bool {
        self.kind() != ErrorKind::Unexpected
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        WsError::InvalidArgument(message.into())
    }
}

/// Framing rule violations detected before a frame reaches the sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A data frame arrived whose opcode cannot start a message.
    #[error("Encountered invalid data frame opcode {0:?}")]
    InvalidDataOpCode(OpCode),

    /// A new message was started while another one is unterminated.
    #[error("Cannot start {attempted} message when {open} message is not complete yet")]
    MessageInProgress {
        /// Type of the message still open.
        open: MessageType,
        /// Type of the message that tried to start.
        attempted: MessageType,
    },

    /// Control frame payloads are limited to 125 bytes.
    #[error("Control frame payload of {size} bytes exceeds maximum of {max}")]
    ControlFrameTooBig {
        /// Offending payload size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Control frames must not be fragmented.
    #[error("Control frame {0:?} must have the final flag set")]
    FragmentedControlFrame(OpCode),
}

/// Failure raised by an encoder.
#[derive(Debug, Clone)]
pub struct EncodeError {
    message: String,
    type_name: Option<&'static str>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl EncodeError {
    /// Create an encode error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            type_name: None,
            source: None,
        }
    }

    /// Create an encode error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            type_name: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Record the type of the value that failed to encode.
    pub fn for_type(mut self, type_name: &'static str) -> Self {
        self.type_name = Some(type_name);
        self
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Type name of the value being encoded, when known.
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name {
            Some(type_name) => write!(f, "{} (value of type {})", self.message, type_name),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        EncodeError::with_source("JSON encoding failed", err)
    }
}

impl From<rmp_serde::encode::Error> for EncodeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        EncodeError::with_source("MsgPack encoding failed", err)
    }
}

/// Result type alias using WsError.
pub type Result<T> = std::result::Result<T, WsError>;
