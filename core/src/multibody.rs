//! Carrying several body parameters in one physical body.
//!
//! # Design
//! When a method has two or more unbound parameters, their arguments are
//! packed into a `PackedBody` keyed by original parameter index and sent as
//! a single object (`{"1": .., "2": ..}`). The `X-Body-Meta` header lists
//! the packed indices, ascending and comma-joined, and is the only signal
//! the receiving side uses to tell a packed body from an ordinary one.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::warn;

use crate::codec::Codec;
use crate::error::{DecodeError, EncodeError};

/// Side-channel header naming the packed parameter indices.
pub const BODY_META_HEADER: &str = "X-Body-Meta";

/// Body arguments keyed by their original parameter index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedBody(BTreeMap<usize, Value>);

impl PackedBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, value: Value) {
        self.0.insert(index, value);
    }

    /// The value packed at `index`; a packed `null` counts as absent.
    pub fn extract(&self, index: usize) -> Option<&Value> {
        self.0.get(&index).filter(|v| !v.is_null())
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Object with string-encoded indices as keys, in ascending index order.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.0.iter().map(|(i, v)| (i.to_string(), v.clone())).collect();
        Value::Object(map)
    }

    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(map) = value else {
            return Err(DecodeError("packed body must be an object".to_string()));
        };
        let mut packed = PackedBody::new();
        for (key, value) in map {
            let index = key
                .parse::<usize>()
                .map_err(|_| DecodeError(format!("packed body key {key:?} is not a parameter index")))?;
            packed.insert(index, value);
        }
        Ok(packed)
    }

    /// Header value listing the packed indices, e.g. `1,2`.
    pub fn meta(&self) -> String {
        format_body_meta(self.0.keys().copied())
    }
}

/// Copy the arguments at `body_indices` into a `PackedBody`, ascending.
///
/// A single index is still wrapped; choosing between wrapped and direct
/// encoding is the resolver's job.
pub fn pack(body_indices: &BTreeSet<usize>, args: &[Value]) -> PackedBody {
    let mut packed = PackedBody::new();
    for &index in body_indices {
        packed.insert(index, args.get(index).cloned().unwrap_or(Value::Null));
    }
    packed
}

pub fn encode(codec: &dyn Codec, packed: &PackedBody) -> Result<Vec<u8>, EncodeError> {
    codec.encode(&packed.to_value())
}

/// Decode a packed body received with an `X-Body-Meta` header.
pub fn unpack(codec: &dyn Codec, body: &[u8]) -> Result<PackedBody, DecodeError> {
    PackedBody::from_value(codec.decode(body)?)
}

pub fn format_body_meta(indices: impl IntoIterator<Item = usize>) -> String {
    indices.into_iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

/// Parse an `X-Body-Meta` value into the packed indices.
///
/// An absent, empty or malformed value yields `None`: the request is then
/// handled as an ordinary single-body request.
pub fn parse_body_meta(raw: Option<&str>) -> Option<BTreeSet<usize>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        warn!(header = BODY_META_HEADER, "empty body meta header, treating body as unpacked");
        return None;
    }
    let mut indices = BTreeSet::new();
    for token in raw.split(',') {
        match token.trim().parse::<usize>() {
            Ok(index) => {
                indices.insert(index);
            }
            Err(_) => {
                warn!(header = BODY_META_HEADER, value = raw, "malformed body meta header, treating body as unpacked");
                return None;
            }
        }
    }
    Some(indices)
}
