//! Encoder registry keyed by runtime type.
//!
//! Registration erases the concrete value type: each encoder is stored as a
//! closure over `&dyn Any` that downcasts before calling the typed encoder.
//! Lookups are keyed by `TypeId`, so the downcast only fails if a caller
//! hands an erased encoder a value of some other type directly.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;

use super::{BinaryEncoder, BinaryStreamEncoder, TextEncoder, TextStreamEncoder};
use crate::error::EncodeError;

type TextFn = dyn Fn(&dyn Any) -> Result<String, EncodeError> + Send + Sync;
type TextStreamFn = dyn Fn(&dyn Any, &mut dyn fmt::Write) -> Result<(), EncodeError> + Send + Sync;
type BinaryFn = dyn Fn(&dyn Any) -> Result<Bytes, EncodeError> + Send + Sync;
type BinaryStreamFn = dyn Fn(&dyn Any, &mut dyn io::Write) -> Result<(), EncodeError> + Send + Sync;

/// A type-erased encoder of one of the four shapes.
#[derive(Clone)]
pub enum Encoder {
    /// Whole text message.
    Text(Arc<TextFn>),
    /// Streamed text message.
    TextStream(Arc<TextStreamFn>),
    /// Whole binary message.
    Binary(Arc<BinaryFn>),
    /// Streamed binary message.
    BinaryStream(Arc<BinaryStreamFn>),
}

impl Encoder {
    /// Short name of the shape, for logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Encoder::Text(_) => "text",
            Encoder::TextStream(_) => "text-stream",
            Encoder::Binary(_) => "binary",
            Encoder::BinaryStream(_) => "binary-stream",
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Encoder").field(&self.shape()).finish()
    }
}

/// A registered encoder together with the name of the type it serves.
#[derive(Debug, Clone)]
pub struct Registration {
    type_name: &'static str,
    encoder: Encoder,
}

impl Registration {
    /// Name of the registered value type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The encoder.
    #[inline]
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }
}

/// Registry mapping value types to encoders.
#[derive(Debug, Default)]
pub struct EncoderRegistry {
    encoders: HashMap<TypeId, Registration>,
}

impl EncoderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// Register a whole-message text encoder for `T`.
    pub fn register_text<T, E>(&mut self, encoder: E)
    where
        T: Any,
        E: TextEncoder<T> + 'static,
    {
        let erased: Arc<TextFn> =
            Arc::new(move |value: &dyn Any| encoder.encode(downcast::<T>(value)?));
        self.insert::<T>(Encoder::Text(erased));
    }

    /// Register a streaming text encoder for `T`.
    pub fn register_text_stream<T, E>(&mut self, encoder: E)
    where
        T: Any,
        E: TextStreamEncoder<T> + 'static,
    {
        let erased: Arc<TextStreamFn> =
            Arc::new(move |value: &dyn Any, writer: &mut dyn fmt::Write| {
                encoder.encode(downcast::<T>(value)?, writer)
            });
        self.insert::<T>(Encoder::TextStream(erased));
    }

    /// Register a whole-message binary encoder for `T`.
    pub fn register_binary<T, E>(&mut self, encoder: E)
    where
        T: Any,
        E: BinaryEncoder<T> + 'static,
    {
        let erased: Arc<BinaryFn> =
            Arc::new(move |value: &dyn Any| encoder.encode(downcast::<T>(value)?));
        self.insert::<T>(Encoder::Binary(erased));
    }

    /// Register a streaming binary encoder for `T`.
    pub fn register_binary_stream<T, E>(&mut self, encoder: E)
    where
        T: Any,
        E: BinaryStreamEncoder<T> + 'static,
    {
        let erased: Arc<BinaryStreamFn> =
            Arc::new(move |value: &dyn Any, out: &mut dyn io::Write| {
                encoder.encode(downcast::<T>(value)?, out)
            });
        self.insert::<T>(Encoder::BinaryStream(erased));
    }

    /// Find the encoder for the runtime type of `value`.
    pub fn lookup(&self, value: &dyn Any) -> Option<&Registration> {
        self.encoders.get(&value.type_id())
    }

    /// Whether an encoder is registered for `T`.
    pub fn contains<T: Any>(&self) -> bool {
        self.encoders.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    /// Later registrations for the same type replace earlier ones.
    fn insert<T: Any>(&mut self, encoder: Encoder) {
        self.encoders.insert(
            TypeId::of::<T>(),
            Registration {
                type_name: type_name::<T>(),
                encoder,
            },
        );
    }
}

fn downcast<T: Any>(value: &dyn Any) -> Result<&T, EncodeError> {
    value.downcast_ref::<T>().ok_or_else(|| {
        EncodeError::new("value does not match the encoder's type").for_type(type_name::<T>())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        x: i32,
        y: i32,
    }

    struct PointText;

    impl TextEncoder<Point> for PointText {
        fn encode(&self, value: &Point) -> Result<String, EncodeError> {
            Ok(format!("{},{}", value.x, value.y))
        }
    }

    struct PointBytes;

    impl BinaryEncoder<Point> for PointBytes {
        fn encode(&self, value: &Point) -> Result<Bytes, EncodeError> {
            Ok(Bytes::from(vec![value.x as u8, value.y as u8]))
        }
    }

    struct Lines;

    impl TextStreamEncoder<Vec<String>> for Lines {
        fn encode(
            &self,
            value: &Vec<String>,
            writer: &mut dyn fmt::Write,
        ) -> Result<(), EncodeError> {
            for line in value {
                writeln!(writer, "{}", line)
                    .map_err(|e| EncodeError::with_source("write failed", e))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_lookup_by_runtime_type() {
        let mut registry = EncoderRegistry::new();
        registry.register_text::<Point, _>(PointText);

        let point = Point { x: 1, y: 2 };
        let registration = registry.lookup(&point).unwrap();
        assert!(registration.type_name().ends_with("Point"));

        match registration.encoder() {
            Encoder::Text(encode) => assert_eq!(encode(&point).unwrap(), "1,2"),
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_type_not_found() {
        let registry = EncoderRegistry::new();
        assert!(registry.lookup(&42u32).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistration_replaces_shape() {
        let mut registry = EncoderRegistry::new();
        registry.register_text::<Point, _>(PointText);
        registry.register_binary::<Point, _>(PointBytes);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains::<Point>());
        let registration = registry.lookup(&Point { x: 3, y: 4 }).unwrap();
        assert_eq!(registration.encoder().shape(), "binary");
    }

    #[test]
    fn test_stream_encoder_writes_through_writer() {
        let mut registry = EncoderRegistry::new();
        registry.register_text_stream::<Vec<String>, _>(Lines);

        let value = vec!["a".to_string(), "b".to_string()];
        let mut out = String::new();
        match registry.lookup(&value).unwrap().encoder() {
            Encoder::TextStream(encode) => encode(&value, &mut out).unwrap(),
            other => panic!("unexpected shape {:?}", other),
        }
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn test_erased_encoder_rejects_foreign_value() {
        let mut registry = EncoderRegistry::new();
        registry.register_text::<Point, _>(PointText);

        let encoder = registry.lookup(&Point { x: 0, y: 0 }).unwrap().encoder().clone();
        match encoder {
            Encoder::Text(encode) => {
                let err = encode(&"not a point").unwrap_err();
                assert!(err.type_name().unwrap().ends_with("Point"));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }
}
