//! Declarative HTTP client bindings with multi-body calls and remote
//! failure propagation.
//!
//! # Overview
//! A remote interface is declared once as an `InterfaceDecl`. Binding it to
//! a target parses every method into a `CallSpec` and produces a
//! `BoundClient`; each call resolves its arguments into a `RequestPlan`,
//! sends it through a pluggable `Transport` and decodes the response.
//!
//! # Design
//! - Arguments travel as `serde_json::Value`; null means "absent".
//! - Two or more unbound arguments are packed into one JSON object keyed by
//!   parameter index, with the indices listed in `X-Body-Meta`. The serving
//!   side rebuilds them with an `ArgumentUnpacker`.
//! - A server failure is written as a 500 response carrying a
//!   `FailureEnvelope`; the client's `FailureRegistry` turns it back into
//!   the same typed error.
//! - No IO happens outside `Transport::send`, so everything up to and after
//!   the network hop is deterministic and testable without a server.

pub mod codec;
pub mod config;
pub mod decl;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod http;
pub mod interceptor;
pub mod multibody;
pub mod pageable;
pub mod resolver;
pub mod spec;
pub mod transport;
pub mod unpack;

pub use codec::{Codec, JsonCodec};
pub use config::ClientConfig;
pub use decl::{InterfaceDecl, MethodDecl, MethodKind, ParamBinding, ParamDecl, ParamType, ReturnKind};
pub use dispatch::{BoundClient, ClientBuilder};
pub use error::{ArgumentError, DecodeError, EncodeError, RpcError, SpecError, TransportError, TransportErrorKind};
pub use failure::{FailureEnvelope, FailureRegistry, PropagatedFailure, RemoteFailure, ResponseSink};
pub use http::{HttpResponse, RequestPlan, Verb};
pub use interceptor::{RequestIdInterceptor, RequestInterceptor};
pub use multibody::{PackedBody, BODY_META_HEADER};
pub use pageable::{Direction, Pageable, SortOrder};
pub use serde_json::Value;
pub use spec::{CallSpec, SpecParser};
pub use transport::{NoRetry, Retryer, Transport};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use unpack::{ArgumentUnpacker, UnpackError};

/// Convert call arguments into the `Value` list `BoundClient::invoke`
/// takes, stopping at the first one that fails to serialize.
///
/// ```
/// let args = bindrpc_core::call_args![42, "text", None::<u32>].unwrap();
/// assert_eq!(args[2], bindrpc_core::Value::Null);
/// ```
#[macro_export]
macro_rules! call_args {
    () => {
        ::std::result::Result::<::std::vec::Vec<$crate::Value>, $crate::ArgumentError>::Ok(::std::vec::Vec::new())
    };
    ($($arg:expr),+ $(,)?) => {
        (|| -> ::std::result::Result<::std::vec::Vec<$crate::Value>, $crate::ArgumentError> {
            ::std::result::Result::Ok(::std::vec![$($crate::codec::to_arg(&$arg)?),+])
        })()
    };
}
