//! Error types for the request pipeline.
//!
//! # Design
//! Every unsuccessful fetch surfaces as a single `FetchFailure`. Callers can
//! branch on `code` alone, the way a status-code-driven client would, or on
//! the explicit `FailureKind` tag. Transport failures that carry no native
//! error code report `ResponseCode::Unknown` (999); decode failures report
//! `DECODE_ERROR_CODE`, which sits outside the HTTP status range.

use std::fmt;

use thiserror::Error;

use crate::http::ResponseCode;

/// Message attached to every transport-level failure.
pub const NETWORK_ERROR_MESSAGE: &str = "Network Error";

/// Code reported when a response body could not be decoded.
pub const DECODE_ERROR_CODE: i64 = 10_001;

/// Which stage of the round-trip produced a `FetchFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No usable HTTP response was received.
    Transport,
    /// A response arrived with a status outside 200..=299.
    Http,
    /// The response body did not decode into the expected shape.
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => f.write_str("transport"),
            FailureKind::Http => f.write_str("http"),
            FailureKind::Decode => f.write_str("decode"),
        }
    }
}

/// The uniform error value handed to a pipeline's error callback.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} failure ({code}): {message}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub code: i64,
    pub message: String,
    /// Present only for HTTP-level failures.
    pub headers: Option<Vec<(String, String)>>,
    /// Seconds between dispatch and completion, when known.
    pub response_time: Option<f64>,
}

impl FetchFailure {
    /// No response was received. `native_code` is the transport's own error
    /// code; without one the failure reports `ResponseCode::Unknown`.
    pub fn transport(native_code: Option<i64>, response_time: Option<f64>) -> Self {
        Self {
            kind: FailureKind::Transport,
            code: native_code.unwrap_or(ResponseCode::Unknown.code()),
            message: NETWORK_ERROR_MESSAGE.to_string(),
            headers: None,
            response_time,
        }
    }

    /// A non-2xx response. The message is the raw response body as text.
    pub fn http(
        status: u16,
        body_text: impl Into<String>,
        headers: Vec<(String, String)>,
        response_time: Option<f64>,
    ) -> Self {
        Self {
            kind: FailureKind::Http,
            code: i64::from(status),
            message: body_text.into(),
            headers: Some(headers),
            response_time,
        }
    }

    pub fn decode(err: &DecodeError, response_time: Option<f64>) -> Self {
        Self {
            kind: FailureKind::Decode,
            code: DECODE_ERROR_CODE,
            message: err.to_string(),
            headers: None,
            response_time,
        }
    }

    /// Named view of `code`; anything unrecognised maps to `Unknown`.
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from_code(self.code)
    }
}

/// Raised by decoders that distinguish a malformed body from an absent one.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while configuring a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The request body could not be serialized to JSON.
    #[error("request body serialization failed: {0}")]
    Body(#[from] serde_json::Error),

    /// Configuration is frozen once the fetcher has been prepared.
    #[error("request already prepared; configuration is frozen")]
    AlreadyPrepared,
}
