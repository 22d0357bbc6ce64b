//! Binding an interface to a target and dispatching calls.
//!
//! # Design
//! `ClientBuilder::bind` parses the interface once and builds a handler
//! table keyed by method name: remote methods get a `MethodHandler`
//! (spec, resolver, transport, decoder, failure reader), default methods
//! keep their own implementation, universal methods are left out. The table
//! never changes after bind, so a `BoundClient` can be cloned and called
//! from many threads at once. Each call is one synchronous round trip on
//! the calling thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{self, Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::decl::{InterfaceDecl, LocalFn, MethodKind, ReturnKind};
use crate::error::{RpcError, SpecError, TransportError};
use crate::failure::{FailureRegistry, RemoteFailure};
use crate::http::{HttpResponse, RequestPlan};
use crate::interceptor::RequestInterceptor;
use crate::resolver::TemplateResolver;
use crate::spec::{CallSpec, SpecParser};
use crate::transport::{NoRetry, Retryer, Transport};

/// Collects the collaborators a bound client is built from.
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    retryer: Arc<dyn Retryer>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    failures: FailureRegistry,
    parser: Option<Arc<SpecParser>>,
}

#[cfg(feature = "ureq")]
impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(crate::transport::UreqTransport::default())
    }
}

impl ClientBuilder {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            codec: Arc::new(JsonCodec),
            retryer: Arc::new(NoRetry),
            interceptors: Vec::new(),
            failures: FailureRegistry::default(),
            parser: None,
        }
    }

    /// Builder using the stock `ureq` transport with the configured timeout.
    #[cfg(feature = "ureq")]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(crate::transport::UreqTransport::new(config.timeout()))
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn retryer(mut self, retryer: impl Retryer + 'static) -> Self {
        self.retryer = Arc::new(retryer);
        self
    }

    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn failures(mut self, failures: FailureRegistry) -> Self {
        self.failures = failures;
        self
    }

    pub fn register_failure<E: RemoteFailure>(mut self) -> Self {
        self.failures.register::<E>();
        self
    }

    /// Share a spec cache between several builders.
    pub fn parser(mut self, parser: Arc<SpecParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Bind every method of `decl` against the target in `config`.
    ///
    /// Any invalid method declaration fails the whole bind.
    pub fn bind(self, decl: &InterfaceDecl, config: &ClientConfig) -> Result<BoundClient, SpecError> {
        let specs = match &self.parser {
            Some(parser) => parser.parse(decl)?,
            None => SpecParser::new().parse(decl)?,
        };
        let mut by_name: HashMap<&str, Arc<CallSpec>> =
            specs.iter().map(|s| (s.method_name(), Arc::clone(s))).collect();

        let shared = Arc::new(Shared {
            resolver: TemplateResolver::new(Arc::clone(&self.codec)),
            transport: self.transport,
            codec: self.codec,
            retryer: self.retryer,
            interceptors: self.interceptors,
            failures: self.failures,
            target_url: config.target_url().to_string(),
            decode_404: config.decode_404,
        });

        let mut handlers = HashMap::new();
        let mut order = Vec::new();
        for method in &decl.methods {
            let handler = match &method.kind {
                MethodKind::Universal => continue,
                MethodKind::Default(body) => Handler::Local(Arc::clone(body)),
                MethodKind::Remote => match by_name.remove(method.name.as_str()) {
                    Some(spec) => Handler::Remote(MethodHandler {
                        spec,
                        shared: Arc::clone(&shared),
                    }),
                    None => {
                        return Err(SpecError::MissingSpec {
                            interface: decl.name.clone(),
                            method: method.name.clone(),
                        })
                    }
                },
            };
            order.push(method.name.clone());
            handlers.insert(method.name.clone(), handler);
        }
        debug!(interface = %decl.name, target = %config.target_url(), methods = order.len(), "bound interface");

        Ok(BoundClient {
            inner: Arc::new(Inner {
                interface: decl.name.clone(),
                config: config.clone(),
                handlers,
                order,
            }),
        })
    }
}

/// Collaborators shared by every handler of one bound client.
struct Shared {
    resolver: TemplateResolver,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    retryer: Arc<dyn Retryer>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    failures: FailureRegistry,
    target_url: String,
    decode_404: bool,
}

enum Handler {
    Remote(MethodHandler),
    Local(LocalFn),
}

struct MethodHandler {
    spec: Arc<CallSpec>,
    shared: Arc<Shared>,
}

impl MethodHandler {
    fn invoke(&self, args: &[Value]) -> Result<Value, RpcError> {
        let shared = &self.shared;
        let mut plan = shared.resolver.resolve(&shared.target_url, &self.spec, args)?;
        for interceptor in &shared.interceptors {
            interceptor.apply(&mut plan);
        }
        let response = self.execute(&plan)?;
        debug!(method = self.spec.config_key(), status = response.status, "received response");
        self.decode(response)
    }

    fn execute(&self, plan: &RequestPlan) -> Result<HttpResponse, TransportError> {
        let mut attempt = 1;
        loop {
            match self.shared.transport.send(plan) {
                Ok(response) => return Ok(response),
                Err(err) => match self.shared.retryer.backoff(attempt, &err) {
                    Some(delay) => {
                        warn!(
                            method = self.spec.config_key(),
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "retrying request"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    fn decode(&self, response: HttpResponse) -> Result<Value, RpcError> {
        if response.is_success() {
            return match self.spec.return_kind() {
                ReturnKind::Unit => Ok(Value::Null),
                ReturnKind::Text => Ok(Value::String(response.body_text())),
                ReturnKind::Value if response.body.is_empty() => Ok(Value::Null),
                ReturnKind::Value => Ok(self.shared.codec.decode(&response.body)?),
            };
        }
        if response.status == 404 && self.shared.decode_404 {
            return Ok(Value::Null);
        }
        if let Some(failure) = self.shared.failures.read_failure(&response) {
            return Err(failure.into());
        }
        if response.status == 404 {
            return Err(RpcError::NotFound);
        }
        Err(RpcError::Status {
            status: response.status,
            body: response.body_text(),
        })
    }
}

struct Inner {
    interface: String,
    config: ClientConfig,
    handlers: HashMap<String, Handler>,
    order: Vec<String>,
}

/// A bound interface: the single entry point every method call goes
/// through.
#[derive(Clone)]
pub struct BoundClient {
    inner: Arc<Inner>,
}

impl BoundClient {
    pub fn interface(&self) -> &str {
        &self.inner.interface
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Bound method names in declaration order.
    pub fn methods(&self) -> &[String] {
        &self.inner.order
    }

    /// The `CallSpec` behind a remote method.
    pub fn spec(&self, method: &str) -> Option<&CallSpec> {
        match self.inner.handlers.get(method)? {
            Handler::Remote(handler) => Some(handler.spec.as_ref()),
            Handler::Local(_) => None,
        }
    }

    /// Invoke one logical call.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, RpcError> {
        match self.inner.handlers.get(method) {
            Some(Handler::Remote(handler)) => handler.invoke(args),
            Some(Handler::Local(body)) => body(self, args),
            None => Err(RpcError::UnknownMethod(method.to_string())),
        }
    }

    /// Invoke one logical call and decode the result into `T`.
    pub fn call<T: DeserializeOwned>(&self, method: &str, args: &[Value]) -> Result<T, RpcError> {
        let value = self.invoke(method, args)?;
        Ok(codec::from_value(value)?)
    }
}

impl std::fmt::Debug for BoundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundClient")
            .field("interface", &self.inner.interface)
            .field("target", &self.inner.config.url)
            .field("methods", &self.inner.order)
            .finish()
    }
}
