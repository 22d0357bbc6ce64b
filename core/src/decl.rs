//! Declarative description of a remote interface.
//!
//! # Design
//! An interface is written down as data instead of being discovered through
//! reflection: class-level defaults on `InterfaceDecl`, per-method verb,
//! path and headers on `MethodDecl`, and one `ParamDecl` per argument
//! position. The parser in `spec` validates these and turns them into
//! immutable `CallSpec`s.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::BoundClient;
use crate::error::RpcError;
use crate::http::Verb;

/// Body of a default method: runs locally and may call back into the client.
pub type LocalFn = Arc<dyn Fn(&BoundClient, &[Value]) -> Result<Value, RpcError> + Send + Sync>;

/// How a declared method is served.
#[derive(Clone)]
pub enum MethodKind {
    /// Dispatched over HTTP.
    Remote,
    /// Has its own implementation; never sent over the wire.
    Default(LocalFn),
    /// Inherited from a universal base type; never bound.
    Universal,
}

impl fmt::Debug for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Remote => f.write_str("Remote"),
            MethodKind::Default(_) => f.write_str("Default(..)"),
            MethodKind::Universal => f.write_str("Universal"),
        }
    }
}

/// Default methods are equal only when they share the same implementation.
impl PartialEq for MethodKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MethodKind::Remote, MethodKind::Remote) | (MethodKind::Universal, MethodKind::Universal) => true,
            (MethodKind::Default(a), MethodKind::Default(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What a successful response decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// The body is ignored and the call yields `null`.
    Unit,
    /// The body is decoded by the codec.
    Value,
    /// The body is returned as a string.
    Text,
}

/// Where a parameter is bound in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamBinding {
    /// `{name}` placeholder in the path.
    Path(Option<String>),
    Query(Option<String>),
    Header(Option<String>),
    /// Field of a form-encoded body.
    Form(Option<String>),
    QueryMap,
    HeaderMap,
}

/// Declared shape of a parameter's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Scalar,
    Sequence,
    Map,
    /// Overrides the call target.
    Url,
    /// Page request expanded into `page`, `size` and `sort` query entries.
    Pageable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub binding: Option<ParamBinding>,
    pub ty: ParamType,
}

impl ParamDecl {
    /// An unannotated parameter; it will be carried in the body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
            ty: ParamType::Any,
        }
    }

    pub fn body(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::Path(None))
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::Query(None))
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::Header(None))
    }

    pub fn form(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::Form(None))
    }

    pub fn query_map(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::QueryMap).ty(ParamType::Map)
    }

    pub fn header_map(name: impl Into<String>) -> Self {
        Self::new(name).bind(ParamBinding::HeaderMap).ty(ParamType::Map)
    }

    pub fn url(name: impl Into<String>) -> Self {
        Self::new(name).ty(ParamType::Url)
    }

    pub fn pageable(name: impl Into<String>) -> Self {
        Self::new(name).ty(ParamType::Pageable)
    }

    pub fn bind(mut self, binding: ParamBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn ty(mut self, ty: ParamType) -> Self {
        self.ty = ty;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub verbs: Vec<Verb>,
    pub paths: Vec<String>,
    /// `Name=Value` entries.
    pub headers: Vec<String>,
    pub produces: Option<String>,
    pub consumes: Option<String>,
    pub params: Vec<ParamDecl>,
    pub returns: ReturnKind,
    pub kind: MethodKind,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbs: Vec::new(),
            paths: Vec::new(),
            headers: Vec::new(),
            produces: None,
            consumes: None,
            params: Vec::new(),
            returns: ReturnKind::Value,
            kind: MethodKind::Remote,
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(name).verb(Verb::Get)
    }

    pub fn post(name: impl Into<String>) -> Self {
        Self::new(name).verb(Verb::Post)
    }

    pub fn put(name: impl Into<String>) -> Self {
        Self::new(name).verb(Verb::Put)
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name).verb(Verb::Delete)
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces = Some(media_type.into());
        self
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes = Some(media_type.into());
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    /// Serve this method locally with `body` instead of over HTTP.
    pub fn default_impl<F>(mut self, body: F) -> Self
    where
        F: Fn(&BoundClient, &[Value]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        self.kind = MethodKind::Default(Arc::new(body));
        self
    }

    pub fn universal(mut self) -> Self {
        self.kind = MethodKind::Universal;
        self
    }
}

/// A remote interface: class-level defaults plus its methods in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub base_path: Option<String>,
    pub headers: Vec<String>,
    pub produces: Option<String>,
    pub consumes: Option<String>,
    pub methods: Vec<MethodDecl>,
}

impl InterfaceDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: None,
            headers: Vec::new(),
            produces: None,
            consumes: None,
            methods: Vec::new(),
        }
    }

    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces = Some(media_type.into());
        self
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes = Some(media_type.into());
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }
}
