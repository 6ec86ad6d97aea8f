//! Storage encodings for extracted values.
//!
//! The indexing engine stores flat values; structured values (the raw item
//! data, for instance) go through a codec that turns them into a storable form
//! and back.

use crate::document::FieldValue;
use std::fmt;
use std::sync::Arc;

/// Error type for codec operations
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(msg) => write!(f, "Encoding error: {}", msg),
            CodecError::Decode(msg) => write!(f, "Decoding error: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encoding strategy for one field's values.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Name used to reference the codec from configuration.
    fn name(&self) -> &'static str;

    /// Turn an extracted value into its stored form.
    fn encode(&self, value: &FieldValue) -> Result<FieldValue, CodecError>;

    /// Inverse of [`Codec::encode`].
    fn decode(&self, value: &FieldValue) -> Result<FieldValue, CodecError>;
}

/// Serializes any value into a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &FieldValue) -> Result<FieldValue, CodecError> {
        match value {
            FieldValue::Null => Ok(FieldValue::Null),
            other => serde_json::to_string(other)
                .map(FieldValue::String)
                .map_err(|e| CodecError::Encode(e.to_string())),
        }
    }

    fn decode(&self, value: &FieldValue) -> Result<FieldValue, CodecError> {
        match value {
            FieldValue::Null => Ok(FieldValue::Null),
            FieldValue::String(text) => {
                serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
            }
            other => Err(CodecError::Decode(format!(
                "expected an encoded string, got a {} value",
                other.kind()
            ))),
        }
    }
}

/// Resolve a codec by its configuration name.
pub fn codec_by_name(name: &str) -> Option<Arc<dyn Codec>> {
    match name {
        "json" => Some(Arc::new(JsonCodec)),
        _ => None,
    }
}
