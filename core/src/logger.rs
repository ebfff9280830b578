//! Traffic logging.
//!
//! # Design
//! Pipelines log through an injected `FetchLogger` that accepts preformatted
//! lines. The default, `TracingLogger`, forwards them to `tracing`, so the
//! embedding application decides where they end up by installing a
//! subscriber. Every body that reaches a log line passes through
//! `RequestScrubber` first; headers are logged as-is.

use crate::error::FetchFailure;
use crate::http::HttpRequest;
use crate::scrubber::RequestScrubber;

/// Sink for preformatted log lines. Must never panic.
pub trait FetchLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to `tracing` under the `restfetch` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl FetchLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "restfetch", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "restfetch", "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl FetchLogger for NoopLogger {
    fn debug(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

pub(crate) fn request_message(
    request_id: &str,
    request: &HttpRequest,
    scrubber: &RequestScrubber,
) -> String {
    let mut message = format!(
        "{request_id}\n{} Request: {}\n Request Headers:\n",
        request.method, request.url
    );
    for (name, value) in &request.headers {
        message.push_str(&format!("\t{name}: {value}\n"));
    }
    message.push_str(&format!(
        "Request Body: {}\n",
        scrubber.scrub(request.body.as_deref())
    ));
    message
}

pub(crate) fn response_message(
    request_id: &str,
    status: u16,
    headers: &[(String, String)],
    body: Option<&[u8]>,
    response_time: f64,
    scrubber: &RequestScrubber,
) -> String {
    let mut message = format!(
        "{request_id}\nResponse took {response_time:.6} seconds\nResponse: {status}\nHeaders:\n"
    );
    for (name, value) in headers {
        message.push_str(&format!("{name}: {value}\n"));
    }
    let text = body.map(String::from_utf8_lossy);
    message.push_str(&format!("Response Body: {}", scrubber.scrub(text.as_deref())));
    message
}

pub(crate) fn failure_message(
    request_id: &str,
    failure: &FetchFailure,
    scrubber: &RequestScrubber,
) -> String {
    let mut message = format!(
        "{request_id}\nResponse took {:.6} seconds\nResponse: {} ({})\nResponse Headers:\n",
        failure.response_time.unwrap_or_default(),
        failure.code,
        failure.kind,
    );
    for (name, value) in failure.headers.iter().flatten() {
        message.push_str(&format!("{name}: {value}\n"));
    }
    message.push_str(&format!(
        "Response Body: {}",
        scrubber.scrub(Some(&failure.message))
    ));
    message
}
