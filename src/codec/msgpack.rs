//! MsgPack binary encoder using `rmp-serde`.
//!
//! Always `to_vec_named` / `write_named`: structs go out as maps with field
//! names, which is what JavaScript peers using `@msgpack/msgpack` expect.
//! The positional array form breaks them.

use std::io;

use bytes::Bytes;
use serde::Serialize;

use crate::encoder::{BinaryEncoder, BinaryStreamEncoder};
use crate::error::EncodeError;

/// Encodes any `Serialize` value as a MsgPack binary message.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackEncoder;

impl<T: Serialize> BinaryEncoder<T> for MsgPackEncoder {
    #[inline]
    fn encode(&self, value: &T) -> Result<Bytes, EncodeError> {
        // to_vec_named, NOT to_vec
        Ok(Bytes::from(rmp_serde::to_vec_named(value)?))
    }
}

impl<T: Serialize> BinaryStreamEncoder<T> for MsgPackEncoder {
    fn encode(&self, value: &T, mut out: &mut dyn io::Write) -> Result<(), EncodeError> {
        rmp_serde::encode::write_named(&mut out, value)?;
        Ok(())
    }
}
