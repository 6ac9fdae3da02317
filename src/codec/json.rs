//! JSON text encoder using `serde_json`.

use std::fmt;
use std::io;
use std::str;

use serde::Serialize;

use crate::encoder::{TextEncoder, TextStreamEncoder};
use crate::error::EncodeError;

/// Encodes any `Serialize` value as a JSON text message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl<T: Serialize> TextEncoder<T> for JsonEncoder {
    #[inline]
    fn encode(&self, value: &T) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(value)?)
    }
}

impl<T: Serialize> TextStreamEncoder<T> for JsonEncoder {
    fn encode(&self, value: &T, writer: &mut dyn fmt::Write) -> Result<(), EncodeError> {
        let mut bridge = Utf8Bridge::new(writer);
        serde_json::to_writer(&mut bridge, value)?;
        bridge.finish()
    }
}

/// Feeds the bytes `serde_json` produces into a `fmt::Write`, holding back
/// a character split across two writes until it is complete.
struct Utf8Bridge<'a> {
    out: &'a mut dyn fmt::Write,
    partial: Vec<u8>,
}

impl<'a> Utf8Bridge<'a> {
    fn new(out: &'a mut dyn fmt::Write) -> Self {
        Self {
            out,
            partial: Vec::new(),
        }
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.out.write_str(text).map_err(io::Error::other)
    }

    fn finish(self) -> Result<(), EncodeError> {
        if self.partial.is_empty() {
            Ok(())
        } else {
            Err(EncodeError::new("JSON output ended inside a UTF-8 sequence"))
        }
    }
}

impl io::Write for Utf8Bridge<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.partial.is_empty() {
            match str::from_utf8(buf) {
                Ok(text) => {
                    self.write_text(text)?;
                    return Ok(buf.len());
                }
                Err(e) if e.error_len().is_some() => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
                Err(_) => {}
            }
        }

        self.partial.extend_from_slice(buf);
        let valid = match str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            Err(e) if e.error_len().is_some() => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e));
            }
            Err(e) => e.valid_up_to(),
        };
        let rest = self.partial.split_off(valid);
        let complete = std::mem::replace(&mut self.partial, rest);
        let text = String::from_utf8(complete)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_text(&text)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Reading {
        sensor: &'static str,
        value: i32,
    }

    #[test]
    fn test_encode_struct() {
        let reading = Reading {
            sensor: "t1",
            value: 7,
        };
        let text = TextEncoder::encode(&JsonEncoder, &reading).unwrap();
        assert_eq!(text, r#"{"sensor":"t1","value":7}"#);
    }

    #[test]
    fn test_stream_matches_whole() {
        let mut map = BTreeMap::new();
        map.insert("a", vec![1, 2]);
        map.insert("b", vec![]);

        let whole = TextEncoder::encode(&JsonEncoder, &map).unwrap();
        let mut streamed = String::new();
        TextStreamEncoder::encode(&JsonEncoder, &map, &mut streamed).unwrap();
        assert_eq!(whole, streamed);
    }

    /// Records every `write_str` call.
    #[derive(Default)]
    struct Chunks(Vec<String>);

    impl fmt::Write for Chunks {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0.push(s.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_stream_writes_incrementally() {
        let values: Vec<u32> = (0..50).collect();
        let mut chunks = Chunks::default();
        TextStreamEncoder::encode(&JsonEncoder, &values, &mut chunks).unwrap();

        assert!(chunks.0.len() > 1);
        assert_eq!(chunks.0.concat(), serde_json::to_string(&values).unwrap());
    }

    #[test]
    fn test_bridge_holds_split_characters() {
        use std::io::Write as _;

        let mut out = String::new();
        let mut bridge = Utf8Bridge::new(&mut out);
        let snowman = "\u{2603}".as_bytes();
        bridge.write_all(b"a").unwrap();
        bridge.write_all(&snowman[..1]).unwrap();
        bridge.write_all(&snowman[1..]).unwrap();
        bridge.write_all(b"b").unwrap();
        bridge.finish().unwrap();
        assert_eq!(out, "a\u{2603}b");
    }

    #[test]
    fn test_bridge_rejects_truncated_character() {
        use std::io::Write as _;

        let mut out = String::new();
        let mut bridge = Utf8Bridge::new(&mut out);
        bridge.write_all(&"\u{2603}".as_bytes()[..2]).unwrap();
        assert!(bridge.finish().is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_bridge_rejects_invalid_bytes() {
        use std::io::Write as _;

        let mut out = String::new();
        let mut bridge = Utf8Bridge::new(&mut out);
        assert!(bridge.write_all(&[0xff, b'a']).is_err());
    }

    #[test]
    fn test_unserializable_map_key_fails() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        let err = TextEncoder::encode(&JsonEncoder, &map).unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
    }
}
