use std::io;

use serde_json::Value;

use super::{Codec, CodecError, Encoding};

/// JSON codec, the default for every data type
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn marshal(&self, out: &mut dyn io::Write, value: &Value) -> Result<(), CodecError> {
        serde_json::to_writer(out, value).map_err(|e| CodecError::Marshal {
            encoding: Encoding::Json,
            reason: e.to_string(),
        })
    }

    fn unmarshal(&self, input: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(input).map_err(|e| CodecError::Unmarshal {
            encoding: Encoding::Json,
            reason: e.to_string(),
        })
    }
}
