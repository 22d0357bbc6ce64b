//! HTTP request and response values exchanged with the transport.
//!
//! # Design
//! A `RequestPlan` is plain data: the resolver fills it in, interceptors may
//! adjust it, and the transport consumes it. Nothing here touches the
//! network. Headers and query parameters are kept as ordered multimaps so
//! repeated names survive untouched; header names compare
//! case-insensitively.

use std::fmt;

/// HTTP verb of a declared method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Patch => "PATCH",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
            Verb::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request, ready for the transport.
///
/// Built per call by `TemplateResolver::resolve`. Once handed to the
/// transport it is only read, including across retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    pub method: Verb,
    /// Origin plus resolved path, without the query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub queries: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestPlan {
    pub fn new(method: Verb, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            queries: Vec::new(),
            body: None,
        }
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with `values`.
    pub fn set_header(&mut self, name: &str, values: Vec<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        for value in values {
            self.headers.push((name.to_string(), value));
        }
    }

    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.queries
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn append_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.queries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with `values`.
    pub fn set_query(&mut self, name: &str, values: Vec<String>) {
        self.queries.retain(|(k, _)| k != name);
        for value in values {
            self.queries.push((name.to_string(), value));
        }
    }

    /// The URL including the percent-encoded query string.
    pub fn full_url(&self) -> String {
        if self.queries.is_empty() {
            return self.url.clone();
        }
        let query = self
            .queries
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }
}

/// An HTTP response described as plain data.
///
/// Produced by a `Transport` on the client and by `write_failure` on the
/// server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut plan = RequestPlan::new(Verb::Get, "http://localhost/a");
        plan.append_header("X-Body-Meta", "1,2");
        assert_eq!(plan.header("x-body-meta"), Some("1,2"));
    }

    #[test]
    fn set_header_replaces_all_values() {
        let mut plan = RequestPlan::new(Verb::Get, "http://localhost/a");
        plan.append_header("Accept", "text/plain");
        plan.append_header("accept", "text/html");
        plan.set_header("Accept", vec!["application/json".into()]);
        assert_eq!(plan.header_values("accept"), vec!["application/json"]);
    }

    #[test]
    fn full_url_encodes_query() {
        let mut plan = RequestPlan::new(Verb::Get, "http://localhost/orders");
        plan.append_query("tag", "a b");
        plan.append_query("tag", "c&d");
        assert_eq!(plan.full_url(), "http://localhost/orders?tag=a%20b&tag=c%26d");
    }

    #[test]
    fn full_url_without_query_is_unchanged() {
        let plan = RequestPlan::new(Verb::Delete, "http://localhost/orders/1");
        assert_eq!(plan.full_url(), "http://localhost/orders/1");
    }

    #[test]
    fn response_success_range() {
        assert!(HttpResponse::new(204, Vec::new()).is_success());
        assert!(!HttpResponse::new(500, Vec::new()).is_success());
    }
}
