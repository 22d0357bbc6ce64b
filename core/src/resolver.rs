//! Turning a `CallSpec` plus live arguments into a `RequestPlan`.
//!
//! # Design
//! Resolution runs in a fixed order because later steps override earlier
//! ones:
//! 1. a URL argument replaces the target origin;
//! 2. declared path, query and header bindings are expanded;
//! 3. query-map and header-map arguments are merged over step 2;
//! 4. pageable arguments become `page` / `size` / `sort` query entries;
//! 5. the body is attached: form-encoded, a single unbound argument encoded
//!    directly, or two or more unbound arguments packed under
//!    `X-Body-Meta`.
//!
//! Null-valued bound arguments are skipped so absent values never show up
//! as empty tokens.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::codec::{self, Codec, FORM_CONTENT_TYPE};
use crate::error::{ArgumentError, RpcError};
use crate::http::RequestPlan;
use crate::multibody::{self, BODY_META_HEADER};
use crate::pageable;
use crate::spec::{BindingKind, CallSpec, CONTENT_TYPE};

#[derive(Clone)]
pub struct TemplateResolver {
    codec: Arc<dyn Codec>,
}

impl TemplateResolver {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Resolve `spec` against `args` for a client targeting `target_url`.
    ///
    /// Fails with `ArgumentError` for unusable arguments and `EncodeError`
    /// when the codec cannot serialize the body.
    pub fn resolve(&self, target_url: &str, spec: &CallSpec, args: &[Value]) -> Result<RequestPlan, RpcError> {
        if args.len() != spec.param_count() {
            return Err(ArgumentError::Arity {
                method: spec.method_name().to_string(),
                expected: spec.param_count(),
                actual: args.len(),
            }
            .into());
        }

        let origin = match spec.url_index() {
            Some(index) => match &args[index] {
                Value::Null => return Err(ArgumentError::NullUrl { index }.into()),
                Value::String(url) => url.clone(),
                _ => return Err(ArgumentError::UrlNotString { index }.into()),
            },
            None => target_url.to_string(),
        };

        let mut plan = RequestPlan::new(spec.verb(), String::new());
        for (name, value) in spec.static_headers() {
            plan.append_header(name.clone(), value.clone());
        }

        let mut path_vars = HashMap::new();
        let mut form_fields = Vec::new();
        for (&index, kind) in spec.bindings() {
            let value = &args[index];
            if value.is_null() {
                continue;
            }
            match kind {
                BindingKind::PathVar(name) => {
                    path_vars.insert(name.as_str(), codec::expand(value).join(","));
                }
                BindingKind::QueryVar(name) => {
                    for text in codec::expand(value) {
                        plan.append_query(name.clone(), text);
                    }
                }
                BindingKind::HeaderVar(name) => {
                    for text in codec::expand(value) {
                        plan.append_header(name.clone(), text);
                    }
                }
                BindingKind::FormVar(name) => form_fields.push((name.clone(), value.clone())),
                _ => {}
            }
        }
        plan.url = format!(
            "{}{}",
            origin.trim_end_matches('/'),
            expand_path(spec.path_template(), &path_vars)
        );

        if let Some(index) = spec.query_map_index() {
            for (name, values) in map_entries(&args[index], "QueryMap", index)? {
                plan.set_query(&name, values);
            }
        }
        if let Some(index) = spec.header_map_index() {
            for (name, values) in map_entries(&args[index], "HeaderMap", index)? {
                plan.set_header(&name, values);
            }
        }

        for (&index, kind) in spec.bindings() {
            if matches!(kind, BindingKind::Pageable) && !args[index].is_null() {
                pageable::apply(&mut plan, index, &args[index])?;
            }
        }

        self.attach_body(&mut plan, spec, args, form_fields)?;
        debug!(
            method = spec.config_key(),
            verb = %plan.method,
            url = %plan.url,
            packed = plan.has_header(BODY_META_HEADER),
            "resolved request"
        );
        Ok(plan)
    }

    fn attach_body(
        &self,
        plan: &mut RequestPlan,
        spec: &CallSpec,
        args: &[Value],
        form_fields: Vec<(String, Value)>,
    ) -> Result<(), RpcError> {
        let body_indices = spec.body_indices();
        let (body, content_type) = if !spec.form_params().is_empty() {
            (self.codec.encode_form(&form_fields)?, FORM_CONTENT_TYPE)
        } else if body_indices.len() == 1 {
            let index = body_indices.iter().copied().next().unwrap_or_default();
            let value = &args[index];
            if value.is_null() {
                return Err(ArgumentError::NullBody { index }.into());
            }
            (self.codec.encode(value)?, self.codec.content_type())
        } else if body_indices.len() > 1 {
            let packed = multibody::pack(body_indices, args);
            plan.set_header(BODY_META_HEADER, vec![packed.meta()]);
            (multibody::encode(self.codec.as_ref(), &packed)?, self.codec.content_type())
        } else {
            return Ok(());
        };
        if !plan.has_header(CONTENT_TYPE) {
            plan.append_header(CONTENT_TYPE, content_type);
        }
        plan.body = Some(body);
        Ok(())
    }
}

/// Substitute `{name}` placeholders; unresolved ones are dropped and the
/// empty segment they leave behind is collapsed.
fn expand_path(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 1..start + len];
        if let Some(value) = vars.get(name) {
            out.push_str(&urlencoding::encode(value));
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.len() > 1 && collapsed.ends_with('/') && !template.ends_with('/') {
        collapsed.pop();
    }
    collapsed
}

/// Entries of a map-bound argument, each value expanded to its texts.
/// Null maps and null entries contribute nothing.
fn map_entries(value: &Value, kind: &'static str, index: usize) -> Result<Vec<(String, Vec<String>)>, ArgumentError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), codec::expand(v)))
            .collect()),
        _ => Err(ArgumentError::NotAMap { kind, index }),
    }
}
