//! Error taxonomy for binding, resolving and dispatching calls.
//!
//! # Design
//! Each failure class gets its own type so callers can tell a broken
//! declaration (`SpecError`, raised once at bind time) from a bad argument
//! on one call (`ArgumentError`) or a codec problem (`EncodeError` /
//! `DecodeError`). `RpcError` is the umbrella returned from every call.
//! Transport failures pass through unchanged and are classified by
//! `TransportErrorKind`, never by message text.

use thiserror::Error;

use crate::failure::PropagatedFailure;

/// A method declaration that cannot be turned into a `CallSpec`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("method {method} not annotated with an HTTP verb (ex. GET, POST)")]
    MissingVerb { method: String },

    #[error("method {method} can only contain 1 verb, found: {verbs:?}")]
    MultipleVerbs { method: String, verbs: Vec<String> },

    #[error("method {method} can only contain at most 1 path, found: {paths:?}")]
    MultiplePaths { method: String, paths: Vec<String> },

    #[error("method {method}: body parameters cannot be used with form parameters")]
    FormWithBody { method: String },

    #[error("method {method}: only one URL parameter is allowed")]
    MultipleUrlParams { method: String },

    #[error("method {method}: {kind} was present on multiple parameters")]
    DuplicateMapParam { method: String, kind: &'static str },

    #[error("method {method}: {kind} parameter at index {index} must be a map")]
    NotAMapParam {
        method: String,
        kind: &'static str,
        index: usize,
    },

    #[error("method {method}: parameter at index {index} has an empty binding name")]
    EmptyBindingName { method: String, index: usize },

    #[error("interface {interface} declares method {method} more than once")]
    DuplicateMethod { interface: String, method: String },

    #[error("interface {interface}: no call spec was parsed for remote method {method}")]
    MissingSpec { interface: String, method: String },
}

/// A call-time argument that does not fit the method's `CallSpec`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("method {method} takes {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("URI parameter {index} was null")]
    NullUrl { index: usize },

    #[error("URI parameter {index} must be a string")]
    UrlNotString { index: usize },

    #[error("body parameter {index} was null")]
    NullBody { index: usize },

    #[error("{kind} parameter {index} must be a map")]
    NotAMap { kind: &'static str, index: usize },

    #[error("pageable parameter {index} is invalid: {reason}")]
    InvalidPageable { index: usize, reason: String },

    #[error("argument could not be converted: {0}")]
    Conversion(String),
}

/// The codec failed to serialize a body or packed body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("encode failed: {0}")]
pub struct EncodeError(pub String);

/// The codec failed to deserialize a body, packed body or return value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

/// Coarse classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Cancelled,
    Connect,
    Io,
}

/// A failure reported by the transport collaborator, passed through as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport I/O failed: {0}")]
    Io(String),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Cancelled => TransportErrorKind::Cancelled,
            TransportError::Connect(_) => TransportErrorKind::Connect,
            TransportError::Io(_) => TransportErrorKind::Io,
        }
    }
}

/// Outcome of a failed call through a `BoundClient`.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The server raised an application failure and it was reconstructed.
    #[error(transparent)]
    Propagated(#[from] PropagatedFailure),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server returned 404 and the client does not decode 404s.
    #[error("resource not found")]
    NotFound,

    /// A non-2xx status with no recognizable failure payload.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no handler bound for method {0}")]
    UnknownMethod(String),
}

impl RpcError {
    /// The transport failure kind, if this error came from the transport.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            RpcError::Transport(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_are_distinct() {
        assert_eq!(TransportError::Timeout.kind(), TransportErrorKind::Timeout);
        assert_eq!(TransportError::Cancelled.kind(), TransportErrorKind::Cancelled);
        assert_eq!(
            TransportError::Connect("refused".into()).kind(),
            TransportErrorKind::Connect
        );
    }

    #[test]
    fn rpc_error_exposes_transport_kind() {
        let err = RpcError::from(TransportError::Timeout);
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
        assert_eq!(RpcError::NotFound.transport_kind(), None);
    }

    #[test]
    fn spec_error_names_the_method() {
        let err = SpecError::MissingVerb {
            method: "create".into(),
        };
        assert!(err.to_string().contains("create"));
    }
}
