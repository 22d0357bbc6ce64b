//! The network side of a call, supplied from outside the binding layer.
//!
//! # Design
//! `Transport::send` is the only place a call blocks. The binding layer
//! never adds its own timeout; timeouts and cancellation come back from the
//! transport as `TransportError` kinds and propagate unchanged. Retrying is
//! delegated to a `Retryer` consulted after each transport failure.

use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpResponse, RequestPlan};

pub trait Transport: Send + Sync {
    /// Execute `plan` and return the response, whatever its status.
    fn send(&self, plan: &RequestPlan) -> Result<HttpResponse, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&RequestPlan) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    fn send(&self, plan: &RequestPlan) -> Result<HttpResponse, TransportError> {
        self(plan)
    }
}

/// Retry policy consulted after a transport failure.
pub trait Retryer: Send + Sync {
    /// Delay before another attempt after `attempt` failed, or `None` to
    /// give up and surface `err`. Attempts are numbered from 1.
    fn backoff(&self, attempt: u32, err: &TransportError) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl Retryer for NoRetry {
    fn backoff(&self, _attempt: u32, _err: &TransportError) -> Option<Duration> {
        None
    }
}

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "ureq")]
mod ureq_transport {
    use std::io;
    use std::time::Duration;

    use tracing::debug;

    use super::Transport;
    use crate::error::TransportError;
    use crate::http::{HttpResponse, RequestPlan, Verb};

    /// Blocking transport over `ureq`.
    ///
    /// Status codes are returned as data, never as errors, so failure
    /// envelopes on 500 responses reach the failure reader.
    #[derive(Debug, Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new(None)
        }
    }

    impl UreqTransport {
        /// `timeout` bounds each whole call; `None` leaves it unbounded.
        pub fn new(timeout: Option<Duration>) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, plan: &RequestPlan) -> ureq::RequestBuilder<B> {
        for (name, value) in &plan.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn with_body(
        builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
        plan: &RequestPlan,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let builder = with_headers(builder, plan);
        match &plan.body {
            Some(body) => builder.send(body.as_slice()),
            None => builder.send_empty(),
        }
    }

    fn map_error(err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::Timeout(_) => TransportError::Timeout,
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => TransportError::Connect(err.to_string()),
            ureq::Error::Io(e) => match e.kind() {
                io::ErrorKind::TimedOut => TransportError::Timeout,
                io::ErrorKind::Interrupted => TransportError::Cancelled,
                io::ErrorKind::ConnectionRefused => TransportError::Connect(e.to_string()),
                _ => TransportError::Io(e.to_string()),
            },
            other => TransportError::Io(other.to_string()),
        }
    }

    impl Transport for UreqTransport {
        fn send(&self, plan: &RequestPlan) -> Result<HttpResponse, TransportError> {
            let url = plan.full_url();
            debug!(verb = %plan.method, url = %url, "sending request");
            let result = match plan.method {
                Verb::Get => with_headers(self.agent.get(&url), plan).call(),
                Verb::Delete => with_headers(self.agent.delete(&url), plan).call(),
                Verb::Head => with_headers(self.agent.head(&url), plan).call(),
                Verb::Options => with_headers(self.agent.options(&url), plan).call(),
                Verb::Trace => with_headers(self.agent.trace(&url), plan).call(),
                Verb::Post => with_body(self.agent.post(&url), plan),
                Verb::Put => with_body(self.agent.put(&url), plan),
                Verb::Patch => with_body(self.agent.patch(&url), plan),
            };
            let mut response = result.map_err(map_error)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.body_mut().read_to_vec().map_err(map_error)?;
            Ok(HttpResponse { status, headers, body })
        }
    }
}
