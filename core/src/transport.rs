//! The transport fetcher contract.
//!
//! # Design
//! A `FetcherBuilder` turns a fully resolved `HttpRequest` into a `Fetcher`
//! handle; calling `Fetcher::fetch` starts the round-trip and returns
//! immediately. The outcome is reported through the `Completion` handed to
//! the builder. `Completion` is consumed by whichever of `succeed`, `fail` or
//! `deliver` runs first, so a fetcher cannot report twice.
//!
//! Fetchers must report on the caller's designated callback context (see
//! `dispatch`); the pipeline does no thread hopping of its own.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::FetchFailure;
use crate::http::{HttpRequest, HttpResponse, ResponseCode};

/// Creates fetcher handles for prepared requests.
pub trait FetcherBuilder: Send + Sync {
    fn create_fetcher(&self, request: HttpRequest, completion: Completion) -> Box<dyn Fetcher>;
}

/// A single prepared round-trip.
pub trait Fetcher: Send {
    /// Start the round-trip. Must not block on the network.
    fn fetch(self: Box<Self>);
}

/// Receives the outcome of a fetch. Implemented by the pipeline.
pub(crate) trait CompletionSink: Send + Sync {
    fn fetch_succeeded(&self, response: HttpResponse, response_time: f64);
    fn fetch_failed(&self, failure: FetchFailure);
}

/// No usable HTTP response: refused connection, DNS failure, timeout and
/// the like. `code` is the transport's native error code, when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error ({code:?}): {detail}")]
pub struct TransportError {
    pub code: Option<i64>,
    pub detail: String,
}

impl TransportError {
    pub fn new(code: Option<i64>, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Single-use handle through which a fetcher reports its outcome.
pub struct Completion {
    sink: Arc<dyn CompletionSink>,
}

impl Completion {
    pub(crate) fn new(sink: Arc<dyn CompletionSink>) -> Self {
        Self { sink }
    }

    /// Report a 2xx response.
    pub fn succeed(self, response: HttpResponse, response_time: f64) {
        self.sink.fetch_succeeded(response, response_time);
    }

    pub fn fail(self, failure: FetchFailure) {
        self.sink.fetch_failed(failure);
    }

    /// Classify a raw transport outcome and report it.
    ///
    /// 2xx responses succeed. Any other status becomes an HTTP failure whose
    /// message is the body text. Transport errors become a "Network Error"
    /// failure carrying the native code, or `ResponseCode::Unknown`.
    pub fn deliver(self, outcome: Result<HttpResponse, TransportError>, response_time: f64) {
        match outcome {
            Ok(response) if ResponseCode::is_success(response.status) => {
                self.succeed(response, response_time)
            }
            Ok(response) => {
                let message = response.body_text();
                self.fail(FetchFailure::http(
                    response.status,
                    message,
                    response.headers,
                    Some(response_time),
                ))
            }
            Err(err) => {
                tracing::debug!(%err, "fetch produced no response");
                self.fail(FetchFailure::transport(err.code, Some(response_time)))
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
