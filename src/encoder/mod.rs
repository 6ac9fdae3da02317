//! Encoder module - turning application values into messages.
//!
//! An encoder comes in one of four shapes:
//!
//! - [`TextEncoder`] - value to a complete `String` (one TEXT frame)
//! - [`TextStreamEncoder`] - value written incrementally as characters
//! - [`BinaryEncoder`] - value to a complete `Bytes` (one BINARY frame)
//! - [`BinaryStreamEncoder`] - value written incrementally as bytes
//!
//! The [`EncoderRegistry`] maps a runtime type to exactly one of these,
//! represented by the closed [`Encoder`] enum so dispatch is an exhaustive
//! match.
//!
//! # Example
//!
//! ```
//! use ws_outgoing::encoder::{Encoder, EncoderRegistry, TextEncoder};
//! use ws_outgoing::EncodeError;
//!
//! struct Celsius(f64);
//!
//! struct CelsiusEncoder;
//!
//! impl TextEncoder<Celsius> for CelsiusEncoder {
//!     fn encode(&self, value: &Celsius) -> Result<String, EncodeError> {
//!         Ok(format!("{:.1}C", value.0))
//!     }
//! }
//!
//! let mut registry = EncoderRegistry::new();
//! registry.register_text::<Celsius, _>(CelsiusEncoder);
//!
//! let value = Celsius(21.5);
//! let registration = registry.lookup(&value).unwrap();
//! assert!(matches!(registration.encoder(), Encoder::Text(_)));
//! ```

mod registry;

use std::fmt;
use std::io;

use bytes::Bytes;

use crate::error::EncodeError;

pub use registry::{Encoder, EncoderRegistry, Registration};

/// Encodes a value into a complete text message.
pub trait TextEncoder<T>: Send + Sync {
    /// Produce the message text.
    fn encode(&self, value: &T) -> Result<String, EncodeError>;
}

/// Encodes a value by writing characters to a message writer.
pub trait TextStreamEncoder<T>: Send + Sync {
    /// Write the message text to `writer`.
    fn encode(&self, value: &T, writer: &mut dyn fmt::Write) -> Result<(), EncodeError>;
}

/// Encodes a value into a complete binary message.
pub trait BinaryEncoder<T>: Send + Sync {
    /// Produce the message bytes.
    fn encode(&self, value: &T) -> Result<Bytes, EncodeError>;
}

/// Encodes a value by writing bytes to a message output stream.
pub trait BinaryStreamEncoder<T>: Send + Sync {
    /// Write the message bytes to `out`.
    fn encode(&self, value: &T, out: &mut dyn io::Write) -> Result<(), EncodeError>;
}
