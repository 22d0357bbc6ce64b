//! Per-method call metadata and the parser that produces it.
//!
//! # Design
//! `parse_interface` walks an `InterfaceDecl` once, validates every remote
//! method and produces one immutable `CallSpec` per method in declaration
//! order. Nothing in a `CallSpec` changes after parsing, so specs are shared
//! freely between concurrent calls. `SpecParser` adds a per-interface cache
//! so repeated binds of the same interface reuse the parsed specs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::decl::{InterfaceDecl, MethodDecl, MethodKind, ParamBinding, ParamDecl, ParamType, ReturnKind};
use crate::error::SpecError;
use crate::http::Verb;

pub const ACCEPT: &str = "Accept";
pub const CONTENT_TYPE: &str = "Content-Type";

/// Where one parameter lands in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    PathVar(String),
    QueryVar(String),
    HeaderVar(String),
    FormVar(String),
    QueryMap,
    HeaderMap,
    Url,
    Pageable,
    /// No declared binding; carried in the body.
    Unbound,
}

/// Immutable request-shape descriptor for one remote method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    config_key: String,
    method_name: String,
    verb: Verb,
    path_template: String,
    param_count: usize,
    bindings: BTreeMap<usize, BindingKind>,
    body_indices: BTreeSet<usize>,
    form_params: Vec<String>,
    static_headers: Vec<(String, String)>,
    return_kind: ReturnKind,
}

impl CallSpec {
    /// `Interface#method`, unique within a bound client.
    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Declared bindings of every non-body parameter, by index.
    pub fn bindings(&self) -> &BTreeMap<usize, BindingKind> {
        &self.bindings
    }

    /// Binding of parameter `index`; body parameters report `Unbound`.
    pub fn binding(&self, index: usize) -> Option<&BindingKind> {
        if self.body_indices.contains(&index) {
            return Some(&BindingKind::Unbound);
        }
        self.bindings.get(&index)
    }

    pub fn body_indices(&self) -> &BTreeSet<usize> {
        &self.body_indices
    }

    pub fn form_params(&self) -> &[String] {
        &self.form_params
    }

    pub fn static_headers(&self) -> &[(String, String)] {
        &self.static_headers
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }

    pub fn url_index(&self) -> Option<usize> {
        self.index_of(|kind| matches!(kind, BindingKind::Url))
    }

    pub fn query_map_index(&self) -> Option<usize> {
        self.index_of(|kind| matches!(kind, BindingKind::QueryMap))
    }

    pub fn header_map_index(&self) -> Option<usize> {
        self.index_of(|kind| matches!(kind, BindingKind::HeaderMap))
    }

    fn index_of(&self, pred: impl Fn(&BindingKind) -> bool) -> Option<usize> {
        self.bindings.iter().find(|(_, kind)| pred(kind)).map(|(i, _)| *i)
    }

    fn has_header(&self, name: &str) -> bool {
        self.static_headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Parse every remote method of `decl` into a `CallSpec`, in declaration
/// order. Default and universal methods are validated for name collisions
/// but produce no spec.
pub fn parse_interface(decl: &InterfaceDecl) -> Result<Vec<CallSpec>, SpecError> {
    let mut seen = HashSet::new();
    let mut specs = Vec::new();
    for method in &decl.methods {
        if !seen.insert(method.name.as_str()) {
            return Err(SpecError::DuplicateMethod {
                interface: decl.name.clone(),
                method: method.name.clone(),
            });
        }
        if matches!(method.kind, MethodKind::Remote) {
            specs.push(parse_method(decl, method)?);
        }
    }
    debug!(interface = %decl.name, methods = specs.len(), "parsed interface");
    Ok(specs)
}

/// Parse a single remote method against its interface's defaults.
pub fn parse_method(decl: &InterfaceDecl, method: &MethodDecl) -> Result<CallSpec, SpecError> {
    let verb = match method.verbs.as_slice() {
        [] => {
            return Err(SpecError::MissingVerb {
                method: method.name.clone(),
            })
        }
        [verb] => *verb,
        verbs => {
            return Err(SpecError::MultipleVerbs {
                method: method.name.clone(),
                verbs: verbs.iter().map(|v| v.to_string()).collect(),
            })
        }
    };
    if method.paths.len() > 1 {
        return Err(SpecError::MultiplePaths {
            method: method.name.clone(),
            paths: method.paths.clone(),
        });
    }

    let mut spec = CallSpec {
        config_key: format!("{}#{}", decl.name, method.name),
        method_name: method.name.clone(),
        verb,
        path_template: join_path(decl.base_path.as_deref(), method.paths.first().map(String::as_str)),
        param_count: method.params.len(),
        bindings: BTreeMap::new(),
        body_indices: BTreeSet::new(),
        form_params: Vec::new(),
        static_headers: Vec::new(),
        return_kind: method.returns,
    };

    if let Some(produces) = non_empty(method.produces.as_deref()) {
        spec.static_headers.push((ACCEPT.to_string(), produces.to_string()));
    }
    if let Some(consumes) = non_empty(method.consumes.as_deref()) {
        spec.static_headers.push((CONTENT_TYPE.to_string(), consumes.to_string()));
    }
    spec.static_headers.extend(method.headers.iter().filter_map(|h| parse_header(h)));

    if !spec.has_header(ACCEPT) {
        if let Some(produces) = non_empty(decl.produces.as_deref()) {
            spec.static_headers.push((ACCEPT.to_string(), produces.to_string()));
        }
    }
    if !spec.has_header(CONTENT_TYPE) {
        if let Some(consumes) = non_empty(decl.consumes.as_deref()) {
            spec.static_headers.push((CONTENT_TYPE.to_string(), consumes.to_string()));
        }
    }
    spec.static_headers.extend(decl.headers.iter().filter_map(|h| parse_header(h)));

    for (index, param) in method.params.iter().enumerate() {
        let kind = binding_for(method, index, param)?;
        match kind {
            BindingKind::Url if spec.url_index().is_some() => {
                return Err(SpecError::MultipleUrlParams {
                    method: method.name.clone(),
                })
            }
            BindingKind::QueryMap if spec.query_map_index().is_some() => {
                return Err(SpecError::DuplicateMapParam {
                    method: method.name.clone(),
                    kind: "QueryMap",
                })
            }
            BindingKind::HeaderMap if spec.header_map_index().is_some() => {
                return Err(SpecError::DuplicateMapParam {
                    method: method.name.clone(),
                    kind: "HeaderMap",
                })
            }
            BindingKind::Unbound => {
                spec.body_indices.insert(index);
                continue;
            }
            BindingKind::FormVar(ref name) => spec.form_params.push(name.clone()),
            _ => {}
        }
        spec.bindings.insert(index, kind);
    }

    if !spec.form_params.is_empty() && !spec.body_indices.is_empty() {
        return Err(SpecError::FormWithBody {
            method: method.name.clone(),
        });
    }
    Ok(spec)
}

fn binding_for(method: &MethodDecl, index: usize, param: &ParamDecl) -> Result<BindingKind, SpecError> {
    if param.ty == ParamType::Url {
        return Ok(BindingKind::Url);
    }
    let named = |explicit: &Option<String>| -> Result<String, SpecError> {
        let name = explicit.as_deref().unwrap_or(&param.name);
        if name.is_empty() {
            return Err(SpecError::EmptyBindingName {
                method: method.name.clone(),
                index,
            });
        }
        Ok(name.to_string())
    };
    let kind = match &param.binding {
        Some(ParamBinding::Path(name)) => BindingKind::PathVar(named(name)?),
        Some(ParamBinding::Query(name)) => BindingKind::QueryVar(named(name)?),
        Some(ParamBinding::Header(name)) => BindingKind::HeaderVar(named(name)?),
        Some(ParamBinding::Form(name)) => BindingKind::FormVar(named(name)?),
        Some(ParamBinding::QueryMap) => {
            if !is_map_type(param.ty) {
                return Err(SpecError::NotAMapParam {
                    method: method.name.clone(),
                    kind: "QueryMap",
                    index,
                });
            }
            BindingKind::QueryMap
        }
        Some(ParamBinding::HeaderMap) => {
            if !is_map_type(param.ty) {
                return Err(SpecError::NotAMapParam {
                    method: method.name.clone(),
                    kind: "HeaderMap",
                    index,
                });
            }
            BindingKind::HeaderMap
        }
        None if param.ty == ParamType::Pageable => BindingKind::Pageable,
        None => BindingKind::Unbound,
    };
    Ok(kind)
}

/// Map-bound parameters must be declared as maps or left untyped.
fn is_map_type(ty: ParamType) -> bool {
    matches!(ty, ParamType::Map | ParamType::Any)
}

fn join_path(base: Option<&str>, suffix: Option<&str>) -> String {
    let mut path = String::new();
    if let Some(base) = non_empty(base) {
        if !base.starts_with('/') {
            path.push('/');
        }
        path.push_str(base);
    }
    if let Some(suffix) = non_empty(suffix) {
        if !suffix.starts_with('/') && !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(suffix);
    }
    path
}

/// `Name=Value` into a header pair; negations and malformed entries are
/// ignored.
fn parse_header(raw: &str) -> Option<(String, String)> {
    if raw.contains("!=") {
        return None;
    }
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Caches parsed specs per interface name.
///
/// Each entry remembers the declaration it was parsed from; a different
/// declaration under the same name is reparsed and replaces the entry.
#[derive(Debug, Default)]
pub struct SpecParser {
    cache: Mutex<HashMap<String, CacheEntry>>,
}

#[derive(Debug)]
struct CacheEntry {
    decl: InterfaceDecl,
    specs: Arc<[Arc<CallSpec>]>,
}

impl SpecParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, decl: &InterfaceDecl) -> Result<Arc<[Arc<CallSpec>]>, SpecError> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cache.get(&decl.name) {
            Some(entry) if entry.decl == *decl => return Ok(Arc::clone(&entry.specs)),
            Some(_) => debug!(interface = %decl.name, "declaration changed, reparsing"),
            None => {}
        }
        let specs: Arc<[Arc<CallSpec>]> = parse_interface(decl)?.into_iter().map(Arc::new).collect();
        cache.insert(
            decl.name.clone(),
            CacheEntry {
                decl: decl.clone(),
                specs: Arc::clone(&specs),
            },
        );
        Ok(specs)
    }
}
