//! End-to-end fetches against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives real pipelines
//! through `UreqFetcherBuilder`. The test thread owns the `CallbackQueue`, so
//! every callback below fires on the test thread while it drains the queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mock_server::{Echo, Thing};
use restfetch_core::{
    CallbackQueue, DataResponse, FailureKind, FetchFailure, FetchLogger, FetchResult, HttpMethod,
    JsonResponse, RequestConfig, RequestPipeline, ResponseDecoder, StringResponse,
    UreqFetcherBuilder, VoidResponse,
};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

#[derive(Default)]
struct RecordingLogger {
    debug: Mutex<Vec<String>>,
    error: Mutex<Vec<String>>,
}

impl FetchLogger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.debug.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.error.lock().unwrap().push(message.to_string());
    }
}

/// Callback outcomes collected on the test thread.
struct Outcomes<T> {
    successes: Arc<Mutex<Vec<FetchResult<T>>>>,
    failures: Arc<Mutex<Vec<FetchFailure>>>,
}

impl<T> Outcomes<T> {
    fn count(&self) -> usize {
        self.successes.lock().unwrap().len() + self.failures.lock().unwrap().len()
    }
}

fn pipeline<D: ResponseDecoder>(
    queue: &CallbackQueue,
    config: RequestConfig,
    decoder: D,
    logger: Arc<RecordingLogger>,
) -> (RequestPipeline<D>, Outcomes<D::Output>) {
    let successes = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let on_success = successes.clone();
    let on_error = failures.clone();
    let pipeline = RequestPipeline::builder(
        config,
        decoder,
        Arc::new(UreqFetcherBuilder::new(queue.sender())),
    )
    .logger(logger)
    .on_success(move |result| on_success.lock().unwrap().push(result))
    .on_error(move |failure| on_error.lock().unwrap().push(failure))
    .build();
    (pipeline, Outcomes { successes, failures })
}

#[test]
fn get_decodes_json_body() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api").path_resource("/things"),
        JsonResponse::<Thing>::new(),
        Arc::default(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    let successes = outcomes.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    assert!(outcomes.failures.lock().unwrap().is_empty());
    let result = &successes[0];
    assert_eq!(result.status_code, 200);
    assert_eq!(
        result.decoded,
        Some(Thing {
            thing: "one".to_string()
        })
    );
    assert!(result
        .headers
        .iter()
        .any(|(name, value)| name == "h1" && value == "v1"));
    assert!(result.response_time >= 0.0);
}

#[test]
fn error_status_reaches_error_callback() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let logger = Arc::new(RecordingLogger::default());
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/status/400"),
        VoidResponse,
        logger.clone(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    assert!(outcomes.successes.lock().unwrap().is_empty());
    let failures = outcomes.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::Http);
    assert_eq!(failures[0].code, 400);
    assert_eq!(failures[0].message, "Some Error");
    let headers = failures[0].headers.as_ref().unwrap();
    assert!(headers.iter().any(|(name, value)| name == "field" && value == "value"));
    assert_eq!(logger.error.lock().unwrap().len(), 1);
}

#[test]
fn refused_connection_is_a_network_error() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let queue = CallbackQueue::new();
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(format!("http://{addr}")).root_path("/api"),
        VoidResponse,
        Arc::default(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    assert!(outcomes.successes.lock().unwrap().is_empty());
    let failures = outcomes.failures.lock().unwrap();
    assert_eq!(failures[0].kind, FailureKind::Transport);
    assert_eq!(failures[0].message, "Network Error");
    assert!(failures[0].headers.is_none());
}

#[test]
fn post_sends_body_query_and_headers() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let logger = Arc::new(RecordingLogger::default());
    let config = RequestConfig::new(&base)
        .method(HttpMethod::Post)
        .root_path("/api/echo")
        .query_argument("arg1", "value 1")
        .query_argument("arg2", "M & Ms")
        .body(json!({"user": "bob", "password": "monkey"}));
    let (request, outcomes) = pipeline(&queue, config, JsonResponse::<Echo>::new(), logger.clone());

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    let successes = outcomes.successes.lock().unwrap();
    let echo = successes[0].decoded.as_ref().unwrap();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.query["arg1"], "value 1");
    assert_eq!(echo.query["arg2"], "M & Ms");
    assert_eq!(echo.content_type.as_deref(), Some("application/json"));
    assert_eq!(echo.accept.as_deref(), Some("application/json"));
    assert_eq!(echo.body, Some(json!({"user": "bob", "password": "monkey"})));

    // Request line and response line both carry the password; neither log
    // line may.
    let debug = logger.debug.lock().unwrap();
    assert_eq!(debug.len(), 2);
    assert!(debug.iter().all(|line| line.starts_with(request.request_id())));
    assert!(debug.iter().all(|line| !line.contains("monkey")), "{debug:?}");
    assert!(debug[0].contains("POST Request: "));
    assert!(debug[1].contains("Response: 200"));
}

#[test]
fn methods_without_body_are_sent() {
    let base = start_server();
    let queue = CallbackQueue::new();
    for method in [HttpMethod::Get, HttpMethod::Delete, HttpMethod::Put, HttpMethod::Patch] {
        let (request, outcomes) = pipeline(
            &queue,
            RequestConfig::new(&base).method(method).root_path("/api/echo"),
            JsonResponse::<Echo>::new(),
            Arc::default(),
        );
        request.fetch();
        assert!(queue.run_until(WAIT, || outcomes.count() > 0));
        let successes = outcomes.successes.lock().unwrap();
        let echo = successes[0].decoded.as_ref().unwrap();
        assert_eq!(echo.method, method.as_str());
        assert!(echo.body.is_none());
    }
}

#[test]
fn get_and_delete_send_configured_body() {
    let base = start_server();
    let queue = CallbackQueue::new();
    for method in [HttpMethod::Get, HttpMethod::Delete] {
        let (request, outcomes) = pipeline(
            &queue,
            RequestConfig::new(&base)
                .method(method)
                .root_path("/api/echo")
                .body(json!({"id": 7})),
            JsonResponse::<Echo>::new(),
            Arc::default(),
        );
        request.fetch();
        assert!(queue.run_until(WAIT, || outcomes.count() > 0));
        let successes = outcomes.successes.lock().unwrap();
        let echo = successes[0].decoded.as_ref().unwrap();
        assert_eq!(echo.method, method.as_str());
        assert_eq!(echo.content_type.as_deref(), Some("application/json"));
        assert_eq!(echo.body, Some(json!({"id": 7})));
    }

    let (history, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/history"),
        JsonResponse::<usize>::new(),
        Arc::default(),
    );
    history.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));
    assert_eq!(outcomes.successes.lock().unwrap()[0].decoded, Some(2));
}

#[test]
fn login_round_trip_is_scrubbed_in_logs() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let logger = Arc::new(RecordingLogger::default());
    let config = RequestConfig::new(&base)
        .method(HttpMethod::Post)
        .root_path("/api/login")
        .body(json!({"user": "bob", "password": "monkey"}))
        .keys_to_scrub(["password", "token"]);
    let (request, outcomes) = pipeline(
        &queue,
        config,
        JsonResponse::<serde_json::Value>::new(),
        logger.clone(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    let successes = outcomes.successes.lock().unwrap();
    let body = successes[0].decoded.as_ref().unwrap();
    assert_eq!(body["token"], "abc123");
    assert_eq!(body["password"], "monkey");

    let debug = logger.debug.lock().unwrap();
    assert_eq!(debug.len(), 2);
    assert!(debug[1].contains(r#""token":"********""#), "{}", debug[1]);
    assert!(debug
        .iter()
        .all(|line| !line.contains("monkey") && !line.contains("abc123")));
}

#[test]
fn wrong_password_failure_is_logged_as_error() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let logger = Arc::new(RecordingLogger::default());
    let config = RequestConfig::new(&base)
        .method(HttpMethod::Post)
        .root_path("/api/login")
        .body(json!({"user": "bob", "password": "banana"}));
    let (request, outcomes) = pipeline(&queue, config, VoidResponse, logger.clone());

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    let failures = outcomes.failures.lock().unwrap();
    assert_eq!(failures[0].code, 401);
    assert_eq!(failures[0].message, "Invalid credentials");
    assert!(logger.debug.lock().unwrap()[0].contains(r#""password":"********""#));
    assert_eq!(logger.error.lock().unwrap().len(), 1);
}

#[test]
fn body_over_ten_megabytes_is_read() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let size = 11 * 1024 * 1024;
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path(format!("/api/large/{size}")),
        DataResponse,
        Arc::default(),
    );

    request.fetch();
    assert!(queue.run_until(Duration::from_secs(20), || outcomes.count() > 0));

    assert!(outcomes.failures.lock().unwrap().is_empty());
    let successes = outcomes.successes.lock().unwrap();
    assert_eq!(successes[0].status_code, 200);
    assert_eq!(successes[0].decoded.as_ref().map(Vec::len), Some(size));
}

#[test]
fn malformed_json_is_a_decode_failure() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/malformed"),
        JsonResponse::<Thing>::new(),
        Arc::default(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    assert!(outcomes.successes.lock().unwrap().is_empty());
    let failures = outcomes.failures.lock().unwrap();
    assert_eq!(failures[0].kind, FailureKind::Decode);
    assert_eq!(failures[0].code, 10_001);
}

#[test]
fn string_and_void_decoders() {
    let base = start_server();
    let queue = CallbackQueue::new();

    let (text, text_outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/text"),
        StringResponse,
        Arc::default(),
    );
    text.fetch();
    assert!(queue.run_until(WAIT, || text_outcomes.count() > 0));
    assert_eq!(
        text_outcomes.successes.lock().unwrap()[0].decoded.as_deref(),
        Some("hello")
    );

    let (empty, empty_outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/empty"),
        VoidResponse,
        Arc::default(),
    );
    empty.fetch();
    assert!(queue.run_until(WAIT, || empty_outcomes.count() > 0));
    let successes = empty_outcomes.successes.lock().unwrap();
    assert_eq!(successes[0].status_code, 204);
    assert!(successes[0].decoded.is_none());
}

#[test]
fn timeout_is_a_network_error() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base)
            .root_path("/api/slow")
            .timeout(Duration::from_millis(200)),
        StringResponse,
        Arc::default(),
    );

    request.fetch();
    assert!(queue.run_until(WAIT, || outcomes.count() > 0));

    let failures = outcomes.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::Transport);
    assert_eq!(failures[0].message, "Network Error");
}

#[test]
fn cancelled_fetch_delivers_nothing() {
    let base = start_server();
    let queue = CallbackQueue::new();
    let (request, outcomes) = pipeline(
        &queue,
        RequestConfig::new(&base).root_path("/api/things"),
        JsonResponse::<Thing>::new(),
        Arc::default(),
    );

    request.fetch();
    request.cancel();

    // The transport still completes and posts to the queue; the pipeline
    // swallows it.
    assert!(queue.run_next(WAIT));
    assert_eq!(outcomes.count(), 0);
}
