//! Declarative REST request pipeline with log scrubbing.
//!
//! # Overview
//! A caller describes an endpoint as a `RequestConfig` (method, URL pieces,
//! query, headers, body, timeout) and picks a `ResponseDecoder` for the body
//! it expects. `RequestPipeline` resolves that into an `HttpRequest`, hands it
//! to an injected transport fetcher, and turns the raw outcome into either a
//! typed `FetchResult` or a uniform `FetchFailure`, delivered through exactly
//! one callback.
//!
//! # Design
//! - Host-does-IO: the pipeline never touches the network itself. The
//!   `transport` traits are the seam; `UreqFetcherBuilder` is the production
//!   implementation and tests plug in in-memory fetchers.
//! - Callbacks fire on a single callback context. Background fetchers post
//!   through `dispatch::CallbackSender` and the owner of the
//!   `CallbackQueue` runs them.
//! - Request and response bodies are logged through `RequestScrubber`, which
//!   redacts the values of sensitive JSON fields.

pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod scrubber;
pub mod transport;
pub mod ureq_fetcher;

pub use config::RequestConfig;
pub use decoder::{DataResponse, JsonResponse, RawResponse, ResponseDecoder, StringResponse, VoidResponse};
pub use dispatch::{CallbackQueue, CallbackSender};
pub use error::{ConfigError, DecodeError, FailureKind, FetchFailure};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ResponseCode};
pub use logger::{FetchLogger, NoopLogger, TracingLogger};
pub use pipeline::{FetchResult, PipelineBuilder, PipelineState, RequestHooks, RequestPipeline};
pub use scrubber::{RequestScrubber, REDACTION_MARKER};
pub use transport::{Completion, Fetcher, FetcherBuilder, TransportError};
pub use ureq_fetcher::UreqFetcherBuilder;
