//! The request/response pipeline.
//!
//! # Design
//! `RequestPipeline` composes a `RequestConfig`, a `ResponseDecoder`, and an
//! injected `FetcherBuilder`, `FetchLogger` and optional `RequestHooks`.
//! Nothing is inherited or global.
//!
//! Lifecycle: `Unprepared -> Prepared -> InFlight -> Succeeded | Failed`,
//! with `cancel()` valid from any state. Cancellation is advisory. The
//! underlying transport keeps running, but both completion paths check the
//! flag before doing anything, so no callback fires once it is set.
//!
//! The completion side (`Shared`) lives behind an `Arc` because the fetcher
//! holds on to it until it reports. The cancellation flag is atomic and all
//! other mutable state sits behind mutexes, so a pipeline may be shared
//! across threads even though callbacks only ever run on the fetcher's
//! callback context.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::config::RequestConfig;
use crate::decoder::ResponseDecoder;
use crate::error::{ConfigError, FetchFailure};
use crate::http::{HttpRequest, HttpResponse};
use crate::logger::{self, FetchLogger, TracingLogger};
use crate::scrubber::RequestScrubber;
use crate::transport::{Completion, CompletionSink, Fetcher, FetcherBuilder};

pub type SuccessCallback<T> = Box<dyn FnMut(FetchResult<T>) + Send>;
pub type ErrorCallback = Box<dyn FnMut(FetchFailure) + Send>;

/// Outcome of a successful fetch, handed to the success callback.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub raw_body: Option<Vec<u8>>,
    /// Seconds between dispatch and completion.
    pub response_time: f64,
    /// `None` when the decoder produced no value.
    pub decoded: Option<T>,
}

/// Observation points around a fetch. Both default to doing nothing.
pub trait RequestHooks: Send + Sync {
    /// Called right before the request is handed to the fetcher.
    fn will_fetch(&self, _request: &HttpRequest) {}

    /// Called with the raw 2xx response right before it is decoded.
    fn will_decode(&self, _response: &HttpResponse, _response_time: f64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unprepared,
    Prepared,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

impl PipelineState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

/// Completion-side state, shared with the fetcher through `Completion`.
struct Shared<D: ResponseDecoder> {
    request_id: String,
    decoder: D,
    scrubber: RequestScrubber,
    logger: Arc<dyn FetchLogger>,
    hooks: Option<Arc<dyn RequestHooks>>,
    cancelled: AtomicBool,
    state: Mutex<PipelineState>,
    on_success: Mutex<Option<SuccessCallback<D::Output>>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl<D: ResponseDecoder> Shared<D> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    fn report_failure(&self, failure: FetchFailure) {
        self.logger
            .error(&logger::failure_message(&self.request_id, &failure, &self.scrubber));
        self.set_state(PipelineState::Failed);
        invoke(&self.on_error, failure);
    }
}

impl<D: ResponseDecoder> CompletionSink for Shared<D> {
    fn fetch_succeeded(&self, response: HttpResponse, response_time: f64) {
        if self.is_cancelled() {
            return;
        }
        self.logger.debug(&logger::response_message(
            &self.request_id,
            response.status,
            &response.headers,
            response.body.as_deref(),
            response_time,
            &self.scrubber,
        ));
        if let Some(hooks) = &self.hooks {
            hooks.will_decode(&response, response_time);
        }

        let decoded = match self.decoder.decode(response.body.as_deref()) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.report_failure(FetchFailure::decode(&err, Some(response_time)));
                return;
            }
        };

        self.set_state(PipelineState::Succeeded);
        let result = FetchResult {
            status_code: response.status,
            headers: response.headers,
            raw_body: response.body,
            response_time,
            decoded,
        };
        invoke(&self.on_success, result);
    }

    fn fetch_failed(&self, failure: FetchFailure) {
        if self.is_cancelled() {
            return;
        }
        self.report_failure(failure);
    }
}

struct Prepared {
    request: HttpRequest,
    fetcher: Box<dyn Fetcher>,
}

/// A configured endpoint that can be fetched through an injected transport.
pub struct RequestPipeline<D: ResponseDecoder> {
    config: RequestConfig,
    fetcher_builder: Arc<dyn FetcherBuilder>,
    shared: Arc<Shared<D>>,
    prepared: Mutex<Option<Prepared>>,
}

impl<D: ResponseDecoder> RequestPipeline<D> {
    pub fn builder(
        config: RequestConfig,
        decoder: D,
        fetcher_builder: Arc<dyn FetcherBuilder>,
    ) -> PipelineBuilder<D> {
        PipelineBuilder {
            config,
            decoder,
            fetcher_builder,
            logger: Arc::new(TracingLogger),
            hooks: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Prefix of every log line this pipeline writes.
    pub fn request_id(&self) -> &str {
        &self.shared.request_id
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.shared.state)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Adjust the configuration. Only allowed before the first `prepare`.
    pub fn configure(&mut self, update: impl FnOnce(&mut RequestConfig)) -> Result<(), ConfigError> {
        let shared = Arc::get_mut(&mut self.shared).ok_or(ConfigError::AlreadyPrepared)?;
        let state = *shared.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state != PipelineState::Unprepared {
            return Err(ConfigError::AlreadyPrepared);
        }
        update(&mut self.config);
        shared.scrubber = RequestScrubber::new(&self.config.keys_to_scrub);
        Ok(())
    }

    /// The request this pipeline would send, resolved from its config.
    pub fn request(&self) -> HttpRequest {
        HttpRequest {
            method: self.config.method,
            url: self.config.request_url(),
            headers: self.config.request_headers(self.shared.decoder.accept_type()),
            body: self.config.request_body(),
            timeout: self.config.timeout,
        }
    }

    /// Build the fetcher handle if it does not exist yet. Repeated calls are
    /// no-ops until the handle is consumed by `fetch`.
    pub fn prepare(&self) {
        let mut prepared = lock(&self.prepared);
        if prepared.is_some() {
            return;
        }
        let request = self.request();
        let sink: Arc<dyn CompletionSink> = self.shared.clone();
        let fetcher = self
            .fetcher_builder
            .create_fetcher(request.clone(), Completion::new(sink));
        *prepared = Some(Prepared { request, fetcher });

        let mut state = lock(&self.shared.state);
        if *state == PipelineState::Unprepared || (state.is_terminal() && !self.is_cancelled()) {
            *state = PipelineState::Prepared;
        }
    }

    /// Dispatch the request. Returns immediately; the outcome arrives later
    /// through the success or error callback.
    ///
    /// Does nothing once cancelled or while a previous fetch is in flight.
    pub fn fetch(&self) {
        {
            let mut state = lock(&self.shared.state);
            if self.is_cancelled() || *state == PipelineState::InFlight {
                tracing::debug!(request_id = %self.shared.request_id, state = ?*state, "fetch skipped");
                return;
            }
            *state = PipelineState::InFlight;
        }

        let prepared = match self.take_prepared() {
            Some(prepared) => prepared,
            None => {
                self.prepare();
                match self.take_prepared() {
                    Some(prepared) => prepared,
                    None => return,
                }
            }
        };

        self.shared.logger.debug(&logger::request_message(
            &self.shared.request_id,
            &prepared.request,
            &self.shared.scrubber,
        ));
        if let Some(hooks) = &self.shared.hooks {
            hooks.will_fetch(&prepared.request);
        }
        prepared.fetcher.fetch();
    }

    /// Suppress every callback from now on. The transport is not aborted.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let mut state = lock(&self.shared.state);
        if !matches!(*state, PipelineState::Succeeded | PipelineState::Failed) {
            *state = PipelineState::Cancelled;
        }
    }

    fn take_prepared(&self) -> Option<Prepared> {
        lock(&self.prepared).take()
    }
}

impl<D: ResponseDecoder + fmt::Debug> fmt::Debug for RequestPipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("request_id", &self.shared.request_id)
            .field("config", &self.config)
            .field("decoder", &self.shared.decoder)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Assembles a `RequestPipeline`. Obtained from `RequestPipeline::builder`.
pub struct PipelineBuilder<D: ResponseDecoder> {
    config: RequestConfig,
    decoder: D,
    fetcher_builder: Arc<dyn FetcherBuilder>,
    logger: Arc<dyn FetchLogger>,
    hooks: Option<Arc<dyn RequestHooks>>,
    on_success: Option<SuccessCallback<D::Output>>,
    on_error: Option<ErrorCallback>,
}

impl<D: ResponseDecoder> PipelineBuilder<D> {
    /// Replace the default `TracingLogger`.
    pub fn logger(mut self, logger: Arc<dyn FetchLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn on_success(mut self, callback: impl FnMut(FetchResult<D::Output>) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(FetchFailure) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> RequestPipeline<D> {
        let shared = Shared {
            request_id: Uuid::new_v4().to_string(),
            scrubber: RequestScrubber::new(&self.config.keys_to_scrub),
            decoder: self.decoder,
            logger: self.logger,
            hooks: self.hooks,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Unprepared),
            on_success: Mutex::new(self.on_success),
            on_error: Mutex::new(self.on_error),
        };
        RequestPipeline {
            config: self.config,
            fetcher_builder: self.fetcher_builder,
            shared: Arc::new(shared),
            prepared: Mutex::new(None),
        }
    }
}

/// Runs the callback with its slot unlocked, so a callback that completes
/// the same pipeline again cannot deadlock. A completion arriving while the
/// callback runs finds the slot empty and reports nothing.
fn invoke<A>(slot: &Mutex<Option<Box<dyn FnMut(A) + Send>>>, arg: A) {
    let Some(mut callback) = lock(slot).take() else {
        return;
    };
    callback(arg);
    let mut slot = lock(slot);
    if slot.is_none() {
        *slot = Some(callback);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
