//! Declarative request configuration and the pure builders derived from it.
//!
//! # Design
//! A concrete endpoint is a `RequestConfig` value rather than a subclass.
//! Each override point (method, URL pieces, query, headers, body, timeout,
//! scrub keys) is a field with a default, and the URL, header and body
//! builders are plain functions of that value. Ordered `(key, value)` pairs
//! keep query strings and headers deterministic: the order they were set in
//! is the order they are emitted.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::http::HttpMethod;

/// Characters escaped in the path portion of a URL. Everything outside the
/// unreserved set plus the path sub-delimiters gets percent-encoded.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b'=')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Characters escaped in a query value. `&` is deliberately left out here and
/// rewritten to `%26` afterwards so it can never split an argument.
const QUERY_ENCODE_SET: &AsciiSet = &PATH_ENCODE_SET.remove(b';').remove(b'?');

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SCRUB_KEY: &str = "password";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Everything needed to describe one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: HttpMethod,
    pub domain: String,
    pub root_path: String,
    pub path_resource: String,
    pub query_arguments: Vec<(String, String)>,
    /// Merged over the base headers; these win on a name collision.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
    /// Key fragments redacted from logged bodies. Never alters the request.
    pub keys_to_scrub: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            domain: String::new(),
            root_path: String::new(),
            path_resource: String::new(),
            query_arguments: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            keys_to_scrub: vec![DEFAULT_SCRUB_KEY.to_string()],
        }
    }
}

impl RequestConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn path_resource(mut self, path_resource: impl Into<String>) -> Self {
        self.path_resource = path_resource.into();
        self
    }

    /// Add a query argument, replacing any earlier value for the same key.
    pub fn query_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.query_arguments, key.into(), value.into(), |a, b| a == b);
        self
    }

    /// Add a header, replacing any earlier value with the same name
    /// (compared case-insensitively).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.headers, name.into(), value.into(), |a, b| a.eq_ignore_ascii_case(b));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize any `Serialize` value into the request body.
    pub fn json_body<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ConfigError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn keys_to_scrub<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys_to_scrub = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Domain followed by the percent-encoded `root_path + path_resource`.
    pub fn url_path(&self) -> String {
        let resource = format!("{}{}", self.root_path, self.path_resource);
        format!("{}{}", self.domain, utf8_percent_encode(&resource, PATH_ENCODE_SET))
    }

    /// `?k1=v1&k2=v2`, or empty when there are no arguments.
    pub fn query_string(&self) -> String {
        if self.query_arguments.is_empty() {
            return String::new();
        }
        let args: Vec<String> = self
            .query_arguments
            .iter()
            .map(|(key, value)| format!("{key}={}", encode_query_value(value)))
            .collect();
        format!("?{}", args.join("&"))
    }

    pub fn request_url(&self) -> String {
        format!("{}{}", self.url_path(), self.query_string())
    }

    /// JSON text of the body. An absent, null or empty-object body yields
    /// `None` rather than `"{}"`.
    pub fn request_body(&self) -> Option<String> {
        match &self.body {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(value.to_string()),
        }
    }

    /// Base headers derived from the decoder's accept type and the presence
    /// of a body, with the configured headers merged on top.
    pub fn request_headers(&self, accept_type: Option<&str>) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(accept) = accept_type {
            headers.push(("Accept".to_string(), accept.to_string()));
        }
        if self.request_body().is_some() {
            headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
        }
        for (name, value) in &self.headers {
            upsert(&mut headers, name.clone(), value.clone(), |a, b| a.eq_ignore_ascii_case(b));
        }
        headers
    }
}

fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET)
        .to_string()
        .replace('&', "%26")
}

fn upsert(
    pairs: &mut Vec<(String, String)>,
    key: String,
    value: String,
    same_key: fn(&str, &str) -> bool,
) {
    match pairs.iter_mut().find(|(existing, _)| same_key(existing, &key)) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
}
