//! axum glue for the serving half of the binding layer.
//!
//! `PackedArgs` binds an `ArgumentUnpacker` to one inbound request, so the
//! packed-body cache lives exactly as long as that request. `Failure` is
//! the write half of the failure channel as an `IntoResponse`.

use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bindrpc_core::failure::write_failure;
use bindrpc_core::{ArgumentUnpacker, FailureEnvelope, JsonCodec, RemoteFailure, ResponseSink, UnpackError, BODY_META_HEADER};
use serde::de::DeserializeOwned;
use tracing::warn;

/// The arguments of one inbound call, packed or not.
///
/// Consumes the request body, so it must be the last extractor.
pub struct PackedArgs(pub ArgumentUnpacker);

impl PackedArgs {
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, UnpackError> {
        self.0.arg(index)
    }

    pub fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T, UnpackError> {
        self.0.required(index)
    }
}

impl<S> FromRequest<S> for PackedArgs
where
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body_meta = req
            .headers()
            .get(BODY_META_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = Bytes::from_request(req, state).await.map_err(|e| UnpackError::Decode {
            reason: e.body_text(),
        })?;
        Ok(PackedArgs(ArgumentUnpacker::new(
            Arc::new(JsonCodec),
            body_meta.as_deref(),
            body.to_vec(),
        )))
    }
}

/// An application failure on its way back to the caller.
#[derive(Debug, Clone)]
pub struct Failure(pub FailureEnvelope);

impl<E: RemoteFailure> From<E> for Failure {
    fn from(failure: E) -> Self {
        Failure(FailureEnvelope::from_failure(&failure))
    }
}

/// `ResponseSink` over an axum response under construction.
struct AxumSink(Response);

impl ResponseSink for AxumSink {
    fn set_status(&mut self, status: u16) {
        *self.0.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.0.headers_mut().insert(name, value);
            }
            _ => warn!(header = name, "dropping invalid failure header"),
        }
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        *self.0.body_mut() = Body::from(bytes.to_vec());
        Ok(())
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut sink = AxumSink(Response::new(Body::empty()));
        write_failure(&mut sink, &self.0);
        sink.0
    }
}
