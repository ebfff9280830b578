//! Production transport fetcher backed by `ureq`.
//!
//! # Design
//! `ureq` is blocking, so each fetch runs on its own worker thread. The
//! outcome is posted back through a `CallbackSender`, and the pipeline's
//! callbacks fire on whichever thread drains the matching `CallbackQueue`.
//!
//! The agent is configured with `http_status_as_error(false)` so 4xx/5xx
//! responses come back as data and are classified by `Completion::deliver`,
//! not by `ureq`.

use std::env;
use std::thread;
use std::time::Instant;

use ureq::typestate::{WithBody, WithoutBody};
use ureq::{Agent, RequestBuilder};

use crate::dispatch::CallbackSender;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Completion, Fetcher, FetcherBuilder, TransportError};

/// Set to `1`, `true` or `yes` to log every round-trip at the transport level.
pub const LOG_CALLS_ENV: &str = "RESTFETCH_LOG_CALLS";

/// Largest response body read into memory. Bigger bodies fail as transport
/// errors. `ureq` alone would stop at 10 MB.
pub const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Reads `LOG_CALLS_ENV`. Unset or unrecognised values mean off.
pub fn traffic_logging_from_env() -> bool {
    env::var(LOG_CALLS_ENV)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            )
        })
        .unwrap_or(false)
}

/// Creates `ureq`-backed fetchers reporting through `callbacks`.
#[derive(Debug, Clone)]
pub struct UreqFetcherBuilder {
    callbacks: CallbackSender,
    log_traffic: bool,
}

impl UreqFetcherBuilder {
    pub fn new(callbacks: CallbackSender) -> Self {
        Self {
            callbacks,
            log_traffic: traffic_logging_from_env(),
        }
    }

    /// Override the `RESTFETCH_LOG_CALLS` setting.
    pub fn log_traffic(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }
}

impl FetcherBuilder for UreqFetcherBuilder {
    fn create_fetcher(&self, request: HttpRequest, completion: Completion) -> Box<dyn Fetcher> {
        Box::new(UreqFetcher {
            request,
            completion,
            callbacks: self.callbacks.clone(),
            log_traffic: self.log_traffic,
        })
    }
}

struct UreqFetcher {
    request: HttpRequest,
    completion: Completion,
    callbacks: CallbackSender,
    log_traffic: bool,
}

impl Fetcher for UreqFetcher {
    fn fetch(self: Box<Self>) {
        let UreqFetcher {
            request,
            completion,
            callbacks,
            log_traffic,
        } = *self;

        thread::spawn(move || {
            let started = Instant::now();
            if log_traffic {
                tracing::debug!(
                    target: "restfetch::transport",
                    method = %request.method,
                    url = %request.url,
                    "sending request"
                );
            }
            let outcome = execute(&request);
            let response_time = started.elapsed().as_secs_f64();
            if log_traffic {
                match &outcome {
                    Ok(response) => tracing::debug!(
                        target: "restfetch::transport",
                        url = %request.url,
                        status = response.status,
                        response_time,
                        "received response"
                    ),
                    Err(err) => tracing::debug!(
                        target: "restfetch::transport",
                        url = %request.url,
                        %err,
                        response_time,
                        "request failed"
                    ),
                }
            }
            callbacks.dispatch(move || completion.deliver(outcome, response_time));
        });
    }
}

fn execute(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let agent: Agent = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(request.timeout))
        .build()
        .new_agent();

    let url = request.url.as_str();
    let body = request.body.as_deref();
    let result = match request.method {
        HttpMethod::Get => without_body(agent.get(url), request),
        HttpMethod::Delete => without_body(agent.delete(url), request),
        HttpMethod::Post => with_body(agent.post(url), request, body),
        HttpMethod::Put => with_body(agent.put(url), request, body),
        HttpMethod::Patch => with_body(agent.patch(url), request, body),
    };

    let mut response = result.map_err(transport_error)?;
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
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_RESPONSE_BYTES)
        .read_to_vec()
        .map_err(transport_error)?;

    Ok(HttpResponse {
        status,
        headers,
        body: Some(body),
    })
}

/// GET and DELETE carry a body only when one is configured.
fn without_body(
    builder: RequestBuilder<WithoutBody>,
    request: &HttpRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match request.body.as_deref() {
        Some(body) => with_body(builder.force_send_body(), request, Some(body)),
        None => apply_headers(builder, &request.headers).call(),
    }
}

fn with_body(
    builder: RequestBuilder<WithBody>,
    request: &HttpRequest,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    let builder = apply_headers(builder, &request.headers);
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

fn apply_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Only I/O errors carry a native code (the OS errno); everything else
/// reports none and ends up as `ResponseCode::Unknown`.
fn transport_error(err: ureq::Error) -> TransportError {
    let code = match &err {
        ureq::Error::Io(io) => io.raw_os_error().map(i64::from),
        _ => None,
    };
    TransportError::new(code, err.to_string())
}
