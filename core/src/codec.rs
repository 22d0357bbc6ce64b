//! Pluggable body codec.
//!
//! Arguments and results travel through the binding layer as
//! `serde_json::Value`; a `Codec` turns those into body bytes and back.
//! `JsonCodec` is the stock implementation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ArgumentError, DecodeError, EncodeError};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub trait Codec: Send + Sync {
    /// Media type written as `Content-Type` for encoded bodies.
    fn content_type(&self) -> &str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError>;

    /// Encode form fields as `application/x-www-form-urlencoded`.
    ///
    /// Sequence values repeat the field name; null values and null
    /// elements are left out.
    fn encode_form(&self, fields: &[(String, Value)]) -> Result<Vec<u8>, EncodeError> {
        let mut pairs = Vec::new();
        for (name, value) in fields {
            for text in expand(value) {
                pairs.push(format!("{}={}", urlencoding::encode(name), urlencoding::encode(&text)));
            }
        }
        Ok(pairs.join("&").into_bytes())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(value).map_err(|e| EncodeError(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }
}

/// String form of a scalar bound value. Strings are used as-is; nested
/// arrays and objects fall back to their JSON text.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Every non-null element of `value` as text, one per element for arrays.
pub fn expand(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(to_text).collect(),
        other => vec![to_text(other)],
    }
}

/// Convert a typed argument into the value carried through a call.
pub fn to_arg<T: Serialize + ?Sized>(value: &T) -> Result<Value, ArgumentError> {
    serde_json::to_value(value).map_err(|e| ArgumentError::Conversion(e.to_string()))
}

/// Convert a call result back into a typed value.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_is_compact() {
        let bytes = JsonCodec.encode(&json!({"x": 1})).unwrap();
        assert_eq!(bytes, br#"{"x":1}"#);
    }

    #[test]
    fn json_codec_rejects_garbage() {
        assert!(JsonCodec.decode(b"not json").is_err());
    }

    #[test]
    fn scalars_convert_to_plain_text() {
        assert_eq!(to_text(&json!("abc")), "abc");
        assert_eq!(to_text(&json!(42)), "42");
        assert_eq!(to_text(&json!(true)), "true");
    }

    #[test]
    fn expand_skips_null_elements() {
        assert_eq!(expand(&json!(["a", null, 3])), vec!["a", "3"]);
        assert!(expand(&Value::Null).is_empty());
    }

    #[test]
    fn form_encoding_repeats_sequences() {
        let fields = vec![
            ("user".to_string(), json!("a b")),
            ("role".to_string(), json!(["x", "y"])),
            ("skip".to_string(), Value::Null),
        ];
        let body = JsonCodec.encode_form(&fields).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "user=a%20b&role=x&role=y");
    }
}
