//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! pipeline builds an `HttpRequest` from a `RequestConfig` and hands it to a
//! transport fetcher; the fetcher reports back an `HttpResponse`. Neither type
//! knows anything about sockets, so both sides of the boundary stay
//! deterministic and easy to fake in tests.
//!
//! Headers are kept as ordered `(name, value)` pairs rather than a hash map so
//! that the order a request was assembled in is the order it is logged and
//! sent.

use std::fmt;
use std::time::Duration;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// Built by `RequestPipeline::prepare` from its `RequestConfig`. The fetcher
/// is responsible for executing it against the network.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the fetcher after the round-trip completes. `body` is
/// `None` when the transport received no payload at all, which is distinct
/// from an empty payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body decoded as UTF-8, replacing invalid sequences. Empty when absent.
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Named status codes callers commonly branch on.
///
/// `Unknown` doubles as the sentinel code reported when a transport failure
/// carries no native error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok = 200,
    NoContent = 204,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    Conflict = 409,
    InternalServerError = 500,
    Unknown = 999,
}

impl ResponseCode {
    /// Map a raw code onto a named variant, falling back to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            200 => ResponseCode::Ok,
            204 => ResponseCode::NoContent,
            400 => ResponseCode::BadRequest,
            401 => ResponseCode::Unauthorized,
            403 => ResponseCode::Forbidden,
            404 => ResponseCode::NotFound,
            405 => ResponseCode::MethodNotAllowed,
            408 => ResponseCode::RequestTimeout,
            409 => ResponseCode::Conflict,
            500 => ResponseCode::InternalServerError,
            _ => ResponseCode::Unknown,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn description(self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::NoContent => "NO CONTENT",
            ResponseCode::BadRequest => "BAD REQUEST",
            ResponseCode::Unauthorized => "UNAUTHORIZED",
            ResponseCode::Forbidden => "FORBIDDEN",
            ResponseCode::NotFound => "NOT FOUND",
            ResponseCode::MethodNotAllowed => "METHOD NOT ALLOWED",
            ResponseCode::RequestTimeout => "REQUEST TIMEOUT",
            ResponseCode::Conflict => "CONFLICT",
            ResponseCode::InternalServerError => "INTERNAL SERVER ERROR",
            ResponseCode::Unknown => "UNKNOWN",
        }
    }

    /// 200 through 299 inclusive.
    pub fn is_success(status: u16) -> bool {
        (200..=299).contains(&status)
    }
}
