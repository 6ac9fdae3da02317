//! Raw encoder - pass-through for values that already are bytes.

use bytes::Bytes;

use crate::encoder::{BinaryEncoder, TextEncoder};
use crate::error::EncodeError;

/// Sends `Bytes`/`Vec<u8>` as binary and `String` as text, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

impl BinaryEncoder<Bytes> for RawEncoder {
    /// Zero-copy: the returned `Bytes` shares the input's memory.
    #[inline]
    fn encode(&self, value: &Bytes) -> Result<Bytes, EncodeError> {
        Ok(value.clone())
    }
}

impl BinaryEncoder<Vec<u8>> for RawEncoder {
    #[inline]
    fn encode(&self, value: &Vec<u8>) -> Result<Bytes, EncodeError> {
        Ok(Bytes::copy_from_slice(value))
    }
}

impl TextEncoder<String> for RawEncoder {
    #[inline]
    fn encode(&self, value: &String) -> Result<String, EncodeError> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_zero_copy() {
        let bytes = Bytes::from_static(b"zero copy");
        let passed = BinaryEncoder::<Bytes>::encode(&RawEncoder, &bytes).unwrap();
        assert_eq!(passed.as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn test_vec_copied() {
        let data = vec![0u8, 1, 2, 255];
        let encoded = BinaryEncoder::<Vec<u8>>::encode(&RawEncoder, &data).unwrap();
        assert_eq!(&encoded[..], &data[..]);
    }

    #[test]
    fn test_string_unchanged() {
        let text = "héllo".to_string();
        assert_eq!(TextEncoder::encode(&RawEncoder, &text).unwrap(), text);
    }
}
