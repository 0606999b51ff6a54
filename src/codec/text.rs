use std::io;

use serde_json::Value;

use super::{Codec, CodecError, Encoding};

/// Plain-text codec for string values
///
/// Strings go out unquoted. Non-string values fall back to their JSON text so
/// the codec never silently loses data.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Text
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn marshal(&self, out: &mut dyn io::Write, value: &Value) -> Result<(), CodecError> {
        let written = match value {
            Value::String(s) => out.write_all(s.as_bytes()),
            other => out.write_all(other.to_string().as_bytes()),
        };
        written.map_err(|e| CodecError::Marshal {
            encoding: Encoding::Text,
            reason: e.to_string(),
        })
    }

    fn unmarshal(&self, input: &[u8]) -> Result<Value, CodecError> {
        std::str::from_utf8(input)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| CodecError::Unmarshal {
                encoding: Encoding::Text,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_written_unquoted() {
        let mut out = Vec::new();
        TextCodec.marshal(&mut out, &json!("living room")).unwrap();
        assert_eq!(out, b"living room");
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = TextCodec.unmarshal(&[0xff, 0xfe]).unwrap_err();
        assert!(err.to_string().contains("TEXT codec"));
    }
}
