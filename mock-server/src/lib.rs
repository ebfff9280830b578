//! Deterministic HTTP peer for exercising the request pipeline end-to-end.
//!
//! Every route answers the same way every time, so integration tests can
//! assert on exact status codes, headers and bodies.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thing {
    pub thing: String,
}

/// What `/api/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub query: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: Option<Value>,
}

/// Requests received by `/api/echo`, newest last.
pub type History = Arc<RwLock<Vec<Echo>>>;

pub fn app() -> Router {
    let history: History = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/api/things", get(get_thing))
        .route(
            "/api/echo",
            get(echo).post(echo).put(echo).patch(echo).delete(echo),
        )
        .route("/api/login", post(login))
        .route("/api/status/{code}", get(status))
        .route("/api/text", get(text))
        .route("/api/malformed", get(malformed))
        .route("/api/empty", get(empty))
        .route("/api/slow", get(slow))
        .route("/api/large/{bytes}", get(large))
        .route("/api/history", get(history_len))
        .with_state(history)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn get_thing() -> impl IntoResponse {
    (
        [("h1", "v1")],
        Json(Thing {
            thing: "one".to_string(),
        }),
    )
}

async fn echo(
    State(history): State<History>,
    method: axum::http::Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    body: String,
) -> Json<Echo> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let echo = Echo {
        method: method.to_string(),
        query,
        content_type: header("content-type"),
        accept: header("accept"),
        body: serde_json::from_str(&body).ok(),
    };
    history.write().await.push(echo.clone());
    Json(echo)
}

#[derive(Deserialize)]
pub struct Login {
    pub user: String,
    pub password: String,
}

async fn login(Json(input): Json<Login>) -> Result<Json<Value>, (StatusCode, String)> {
    if input.password == "monkey" {
        Ok(Json(serde_json::json!({
            "user": input.user,
            "token": "abc123",
            "password": input.password,
        })))
    } else {
        Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))
    }
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [("field", "value")], "Some Error")
}

async fn text() -> &'static str {
    "hello"
}

async fn malformed() -> impl IntoResponse {
    ([("content-type", "application/json")], "not json")
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "finally"
}

/// A plain-text body of exactly `bytes` bytes.
async fn large(Path(bytes): Path<usize>) -> String {
    "x".repeat(bytes)
}

async fn history_len(State(history): State<History>) -> Json<usize> {
    Json(history.read().await.len())
}
