//! Payload codecs
//!
//! Property values and action inputs cross the wire as bytes. A codec turns
//! those bytes into a [`Value`] and back; the [`CodecRegistry`] picks the
//! codec for each declared [`DataType`] and falls back to JSON.

mod json;
mod text;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::thing::DataType;

pub use json::JsonCodec;
pub use text::TextCodec;

/// Codec identity, reported in errors and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Encoding {
    Json,
    Text,
}

impl Encoding {
    /// Upper-case identity name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec failure, always naming the codec that failed
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input bytes could not be decoded
    #[error("error unmarshaling input using {encoding} codec: {reason}")]
    Unmarshal { encoding: Encoding, reason: String },

    /// Value could not be encoded
    #[error("error marshaling output using {encoding} codec: {reason}")]
    Marshal { encoding: Encoding, reason: String },

    /// Decoded value does not match the declared type
    #[error("{encoding} codec decoded {found}, expected {expected}")]
    TypeMismatch {
        encoding: Encoding,
        expected: DataType,
        found: &'static str,
    },
}

/// Marshals values to bytes and back
pub trait Codec: Send + Sync {
    /// Codec identity
    fn encoding(&self) -> Encoding;

    /// MIME type of encoded output
    fn content_type(&self) -> &'static str;

    /// Write `value` to `out`
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Marshal`] if the value cannot be written
    fn marshal(&self, out: &mut dyn io::Write, value: &Value) -> Result<(), CodecError>;

    /// Decode `input` into a value
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unmarshal`] if the input is malformed
    fn unmarshal(&self, input: &[u8]) -> Result<Value, CodecError>;
}

/// Encoded payload ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// Codec lookup by declared data type
#[derive(Clone)]
pub struct CodecRegistry {
    default: Arc<dyn Codec>,
    by_type: HashMap<DataType, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Registry that uses JSON for everything
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: Arc::new(JsonCodec),
            by_type: HashMap::new(),
        }
    }

    /// Registry that serves `string` values as plain text
    #[must_use]
    pub fn plain_text_strings() -> Self {
        Self::new().with(DataType::String, TextCodec)
    }

    /// Register `codec` for `ty`, replacing any previous one
    pub fn register(&mut self, ty: DataType, codec: impl Codec + 'static) {
        self.by_type.insert(ty, Arc::new(codec));
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with(mut self, ty: DataType, codec: impl Codec + 'static) -> Self {
        self.register(ty, codec);
        self
    }

    /// Codec for `ty`, or the default
    #[must_use]
    pub fn resolve(&self, ty: DataType) -> &dyn Codec {
        self.by_type.get(&ty).unwrap_or(&self.default).as_ref()
    }

    /// Encode `value` using the codec for `ty`
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Marshal`] if encoding fails
    pub fn encode(&self, ty: DataType, value: &Value) -> Result<Encoded, CodecError> {
        let codec = self.resolve(ty);
        let mut body = Vec::new();
        codec.marshal(&mut body, value)?;
        Ok(Encoded {
            body,
            content_type: codec.content_type(),
        })
    }

    /// Decode `input` using the codec for `ty` and check it conforms
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unmarshal`] for malformed input and
    /// [`CodecError::TypeMismatch`] when the value has the wrong kind
    pub fn decode(&self, ty: DataType, input: &[u8]) -> Result<Value, CodecError> {
        let codec = self.resolve(ty);
        let value = codec.unmarshal(input)?;
        if !ty.accepts(&value) {
            return Err(CodecError::TypeMismatch {
                encoding: codec.encoding(),
                expected: ty,
                found: DataType::kind_of(&value),
            });
        }
        Ok(value)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut overrides: Vec<_> = self
            .by_type
            .iter()
            .map(|(ty, codec)| (ty.as_str(), codec.encoding()))
            .collect();
        overrides.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("default", &self.default.encoding())
            .field("overrides", &overrides)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unregistered_types_use_json() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.resolve(DataType::Boolean).encoding(), Encoding::Json);
        assert_eq!(registry.resolve(DataType::String).encoding(), Encoding::Json);
    }

    #[test]
    fn plain_text_strings_override_string_only() {
        let registry = CodecRegistry::plain_text_strings();
        assert_eq!(registry.resolve(DataType::String).encoding(), Encoding::Text);
        assert_eq!(registry.resolve(DataType::Object).encoding(), Encoding::Json);

        let encoded = registry.encode(DataType::String, &json!("hello")).unwrap();
        assert_eq!(encoded.body, b"hello");
        assert_eq!(encoded.content_type, "text/plain; charset=utf-8");
    }

    #[test]
    fn decode_checks_declared_type() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.decode(DataType::Boolean, b"true").unwrap(), json!(true));

        let err = registry.decode(DataType::Boolean, b"\"yes\"").unwrap_err();
        assert!(matches!(
            err,
            CodecError::TypeMismatch {
                encoding: Encoding::Json,
                expected: DataType::Boolean,
                found: "string"
            }
        ));
    }

    #[test]
    fn malformed_input_names_codec() {
        let registry = CodecRegistry::new();
        let err = registry.decode(DataType::Any, b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Unmarshal { encoding: Encoding::Json, .. }));
        assert!(err.to_string().contains("JSON codec"));
    }

    #[test]
    fn encode_reports_content_type() {
        let registry = CodecRegistry::new();
        let encoded = registry.encode(DataType::Object, &json!({"motion": true})).unwrap();
        assert_eq!(encoded.content_type, "application/json");
        assert_eq!(
            serde_json::from_slice::<Value>(&encoded.body).unwrap(),
            json!({"motion": true})
        );
    }
}
