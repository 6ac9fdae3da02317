//! Codec module - ready-made encoders for common payload formats.
//!
//! - [`JsonEncoder`] - text messages via `serde_json`
//! - [`MsgPackEncoder`] - binary messages via `rmp-serde` (`to_vec_named`)
//! - [`RawEncoder`] - pass-through for values that already are bytes
//!
//! Codecs are marker structs implementing the traits from
//! [`crate::encoder`] for every serializable type, so one value can be
//! registered for as many types as needed.
//!
//! # Example
//!
//! ```
//! use serde::Serialize;
//! use ws_outgoing::codec::JsonEncoder;
//! use ws_outgoing::encoder::EncoderRegistry;
//!
//! #[derive(Serialize)]
//! struct Greeting {
//!     text: String,
//! }
//!
//! let mut registry = EncoderRegistry::new();
//! registry.register_text::<Greeting, _>(JsonEncoder);
//! assert!(registry.contains::<Greeting>());
//! ```

mod json;
mod msgpack;
mod raw;

pub use json::JsonEncoder;
pub use msgpack::MsgPackEncoder;
pub use raw::RawEncoder;
