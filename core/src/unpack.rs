//! Server-side reconstruction of individual arguments from one request.
//!
//! # Design
//! An `ArgumentUnpacker` is created per inbound request from its
//! `X-Body-Meta` header and body bytes, and is passed explicitly to the
//! handler. The packed body is decoded on first extraction and cached in
//! the unpacker, so every later extraction from the same request reads the
//! cached container. Nothing is shared between requests.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::codec::Codec;
use crate::error::DecodeError;
use crate::failure::RemoteFailure;
use crate::multibody::{self, PackedBody};

/// Failure to bind an argument from an inbound request.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnpackError {
    #[error("request body could not be decoded: {reason}")]
    Decode { reason: String },

    #[error("parameter {index} is not carried in the packed body")]
    NotPacked { index: usize },

    #[error("parameter {index} is missing")]
    Missing { index: usize },

    #[error("parameter {index} could not be converted: {reason}")]
    Convert { index: usize, reason: String },
}

impl RemoteFailure for UnpackError {
    const KIND: &'static str = "bindrpc.unpack";
}

impl From<DecodeError> for UnpackError {
    fn from(err: DecodeError) -> Self {
        UnpackError::Decode { reason: err.0 }
    }
}

pub struct ArgumentUnpacker {
    codec: Arc<dyn Codec>,
    packed_indices: Option<BTreeSet<usize>>,
    body: Vec<u8>,
    packed: OnceLock<Result<PackedBody, DecodeError>>,
}

impl ArgumentUnpacker {
    /// `body_meta` is the raw `X-Body-Meta` header value, if present.
    pub fn new(codec: Arc<dyn Codec>, body_meta: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            codec,
            packed_indices: multibody::parse_body_meta(body_meta),
            body,
            packed: OnceLock::new(),
        }
    }

    pub fn is_packed(&self) -> bool {
        self.packed_indices.is_some()
    }

    pub fn packed_indices(&self) -> Option<&BTreeSet<usize>> {
        self.packed_indices.as_ref()
    }

    /// The decoded packed body, decoded at most once per request.
    pub fn packed(&self) -> Result<&PackedBody, UnpackError> {
        let cached = self.packed.get_or_init(|| {
            debug!(bytes = self.body.len(), "unpacking request body");
            multibody::unpack(self.codec.as_ref(), &self.body)
        });
        cached.as_ref().map_err(|e| UnpackError::from(e.clone()))
    }

    /// Raw value of parameter `index`.
    ///
    /// For a packed request the value comes from the packed body; otherwise
    /// the whole body is the value.
    pub fn raw(&self, index: usize) -> Result<Option<Value>, UnpackError> {
        match &self.packed_indices {
            Some(indices) => {
                if !indices.contains(&index) {
                    return Err(UnpackError::NotPacked { index });
                }
                Ok(self.packed()?.extract(index).cloned())
            }
            None if self.body.is_empty() => Ok(None),
            None => {
                let value = self.codec.decode(&self.body)?;
                Ok(Some(value).filter(|v| !v.is_null()))
            }
        }
    }

    /// Parameter `index` converted to `T`; `None` when absent or null.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, UnpackError> {
        self.raw(index)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| UnpackError::Convert {
                    index,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parameter `index` converted to `T`; absence is an error.
    pub fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T, UnpackError> {
        self.arg(index)?.ok_or(UnpackError::Missing { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[derive(Debug, Deserialize, PartialEq)]
    struct A {
        x: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct B {
        y: i64,
    }

    fn unpacker(meta: Option<&str>, body: &str) -> ArgumentUnpacker {
        ArgumentUnpacker::new(Arc::new(JsonCodec), meta, body.as_bytes().to_vec())
    }

    #[test]
    fn packed_arguments_are_extracted_by_index() {
        let u = unpacker(Some("1,2"), r#"{"1":{"x":1},"2":{"y":2}}"#);
        assert!(u.is_packed());
        assert_eq!(u.required::<A>(1).unwrap(), A { x: 1 });
        assert_eq!(u.required::<B>(2).unwrap(), B { y: 2 });
    }

    #[test]
    fn packed_body_is_decoded_once() {
        let u = unpacker(Some("1,2"), r#"{"1":{"x":1},"2":{"y":2}}"#);
        let first = u.packed().unwrap() as *const PackedBody;
        let second = u.packed().unwrap() as *const PackedBody;
        assert_eq!(first, second);
    }

    #[test]
    fn unlisted_index_is_rejected() {
        let u = unpacker(Some("1,2"), r#"{"1":{"x":1},"2":{"y":2}}"#);
        assert_eq!(u.raw(0).unwrap_err(), UnpackError::NotPacked { index: 0 });
    }

    #[test]
    fn packed_null_is_absent() {
        let u = unpacker(Some("1,2"), r#"{"1":null,"2":{"y":2}}"#);
        assert_eq!(u.arg::<A>(1).unwrap(), None);
        assert_eq!(u.required::<A>(1).unwrap_err(), UnpackError::Missing { index: 1 });
    }

    #[test]
    fn malformed_packed_body_is_a_decode_error() {
        let u = unpacker(Some("1,2"), "[1,2]");
        assert!(matches!(u.raw(1).unwrap_err(), UnpackError::Decode { .. }));
    }

    #[test]
    fn without_header_the_body_is_one_argument() {
        let u = unpacker(None, r#"{"x":1}"#);
        assert!(!u.is_packed());
        assert_eq!(u.required::<A>(1).unwrap(), A { x: 1 });
    }

    #[test]
    fn malformed_header_falls_back_to_plain_body() {
        let u = unpacker(Some("one,two"), r#"{"x":5}"#);
        assert!(!u.is_packed());
        assert_eq!(u.required::<A>(0).unwrap(), A { x: 5 });
    }

    #[test]
    fn type_mismatch_is_a_convert_error() {
        let u = unpacker(Some("1"), r#"{"1":{"x":"one"}}"#);
        assert!(matches!(u.arg::<A>(1).unwrap_err(), UnpackError::Convert { index: 1, .. }));
    }

    #[test]
    fn empty_plain_body_is_absent() {
        let u = unpacker(None, "");
        assert_eq!(u.arg::<A>(0).unwrap(), None);
    }
}
