//! Carrying server-side application failures back to the caller.
//!
//! # Design
//! The server writes a failed call as status 500 with a JSON envelope:
//!
//! ```text
//! {"failure": {"kind": "orders.not_found", "message": "...", "fields": {...}}}
//! ```
//!
//! The status only says that something failed; the envelope says what. The
//! top-level `failure` key marks the body as an application failure rather
//! than an ordinary error page. On the client a `FailureRegistry` maps
//! `kind` back to a registered Rust error type. Bodies that are not
//! envelopes, unknown kinds and corrupt fields all yield `None`, so the
//! caller falls back to a generic status error instead of a decode error.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::codec::JSON_CONTENT_TYPE;
use crate::error::{DecodeError, EncodeError};
use crate::http::HttpResponse;
use crate::spec::CONTENT_TYPE;
use crate::unpack::UnpackError;

/// Status written for every propagated failure.
pub const FAILURE_STATUS: u16 = 500;

/// An error type that can cross the process boundary.
///
/// `KIND` is the stable identifier written on the wire; the serde
/// representation of the value becomes the envelope's `fields`.
pub trait RemoteFailure: StdError + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
}

/// Structured description of one application failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct WireFailure {
    failure: FailureEnvelope,
}

impl FailureEnvelope {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Envelope for a registered failure type, with all of its fields.
    pub fn from_failure<E: RemoteFailure>(failure: &E) -> Self {
        let mut envelope = Self::new(E::KIND, failure.to_string());
        match serde_json::to_value(failure) {
            Ok(Value::Object(fields)) => envelope.fields = fields,
            Ok(other) => {
                envelope.fields.insert("value".to_string(), other);
            }
            Err(e) => warn!(kind = E::KIND, error = %e, "failure fields not serializable, sending message only"),
        }
        envelope
    }

    /// Envelope for an arbitrary error; only its message is carried.
    pub fn from_error(kind: impl Into<String>, err: &dyn StdError) -> Self {
        Self::new(kind, err.to_string())
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let wire = WireFailure { failure: self.clone() };
        serde_json::to_vec(&wire).map_err(|e| EncodeError(e.to_string()))
    }

    /// Parse a response body as an envelope.
    ///
    /// `Ok(None)` means the body is not in envelope format at all; `Err`
    /// means it claims to be an envelope but is corrupt.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, DecodeError> {
        let Ok(Value::Object(mut body)) = serde_json::from_slice::<Value>(bytes) else {
            return Ok(None);
        };
        let Some(failure) = body.remove("failure") else {
            return Ok(None);
        };
        serde_json::from_value(failure)
            .map(Some)
            .map_err(|e| DecodeError(e.to_string()))
    }
}

/// Where the server write path puts a failure.
pub trait ResponseSink {
    fn set_status(&mut self, status: u16);

    fn set_header(&mut self, name: &str, value: &str);

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl ResponseSink for HttpResponse {
    fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

/// Write `failure` into `sink` as status 500 plus envelope.
///
/// Never fails: a body that cannot be written is logged and dropped, and
/// the sink keeps the failure status.
pub fn write_failure(sink: &mut dyn ResponseSink, failure: &FailureEnvelope) {
    error!(kind = %failure.kind, message = %failure.message, "service call failed");
    sink.set_status(FAILURE_STATUS);
    let bytes = match failure.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(kind = %failure.kind, error = %e, "failed to encode failure envelope");
            return;
        }
    };
    sink.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    if let Err(e) = sink.write_body(&bytes) {
        error!(kind = %failure.kind, error = %e, "failed to write failure envelope");
    }
}

/// A server-side failure reconstructed on the client.
#[derive(Debug, Clone)]
pub struct PropagatedFailure {
    envelope: FailureEnvelope,
    typed: Arc<dyn StdError + Send + Sync>,
}

impl PropagatedFailure {
    pub fn kind(&self) -> &str {
        &self.envelope.kind
    }

    pub fn message(&self) -> &str {
        &self.envelope.message
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.envelope.fields
    }

    pub fn envelope(&self) -> &FailureEnvelope {
        &self.envelope
    }

    /// The reconstructed error as its concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.typed.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

impl fmt::Display for PropagatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.envelope.kind, self.envelope.message)
    }
}

impl StdError for PropagatedFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.typed)
    }
}

type Reconstruct = fn(&FailureEnvelope) -> Result<Arc<dyn StdError + Send + Sync>, DecodeError>;

fn reconstruct<E: RemoteFailure>(envelope: &FailureEnvelope) -> Result<Arc<dyn StdError + Send + Sync>, DecodeError> {
    let fields = Value::Object(envelope.fields.clone());
    let typed = match serde_json::from_value::<E>(fields) {
        Ok(typed) => typed,
        Err(first) => match envelope.fields.get("value") {
            Some(value) if envelope.fields.len() == 1 => {
                serde_json::from_value::<E>(value.clone()).map_err(|e| DecodeError(e.to_string()))?
            }
            _ => return Err(DecodeError(first.to_string())),
        },
    };
    Ok(Arc::new(typed))
}

/// Maps failure kinds to the Rust error types they reconstruct into.
///
/// The default registry knows the binding layer's own `UnpackError`.
#[derive(Clone)]
pub struct FailureRegistry {
    by_kind: HashMap<&'static str, Reconstruct>,
}

impl Default for FailureRegistry {
    fn default() -> Self {
        Self::empty().with::<UnpackError>()
    }
}

impl fmt::Debug for FailureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.keys().collect();
        kinds.sort();
        f.debug_struct("FailureRegistry").field("kinds", &kinds).finish()
    }
}

impl FailureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }

    pub fn register<E: RemoteFailure>(&mut self) -> &mut Self {
        self.by_kind.insert(E::KIND, reconstruct::<E>);
        self
    }

    pub fn with<E: RemoteFailure>(mut self) -> Self {
        self.register::<E>();
        self
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    /// Reconstruct the failure carried by `response`, if any.
    pub fn read_failure(&self, response: &HttpResponse) -> Option<PropagatedFailure> {
        if response.body.is_empty() {
            return None;
        }
        let envelope = match FailureEnvelope::from_bytes(&response.body) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(status = response.status, "error response carries no failure envelope");
                return None;
            }
            Err(e) => {
                error!(status = response.status, error = %e, "corrupt failure envelope");
                return None;
            }
        };
        let Some(rebuild) = self.by_kind.get(envelope.kind.as_str()) else {
            warn!(kind = %envelope.kind, "unknown failure kind, falling back to status error");
            return None;
        };
        match rebuild(&envelope) {
            Ok(typed) => {
                error!(kind = %envelope.kind, message = %envelope.message, "received application failure");
                Some(PropagatedFailure { envelope, typed })
            }
            Err(e) => {
                error!(kind = %envelope.kind, error = %e, "failure fields do not match registered type");
                None
            }
        }
    }
}
