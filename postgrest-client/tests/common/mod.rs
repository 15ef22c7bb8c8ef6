//! In-process PostgREST stand-in for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde::Deserialize;
use serde_json::json;

/// What the echo handler saw.
#[derive(Debug, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(name)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Decoded query pairs in wire order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_deref().unwrap_or_default().as_bytes())
            .into_owned()
            .collect()
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<serde_json::Value> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Echoes every request back as JSON.
pub fn echo_router() -> Router {
    Router::new().fallback(echo)
}

/// A table with a `Content-Range`, an error route and an echo fallback.
pub fn postgrest_router() -> Router {
    Router::new()
        .route(
            "/film",
            get(|| async {
                (
                    [(header::CONTENT_RANGE, "0-1/42")],
                    Json(json!([{"film_id": 1}, {"film_id": 2}])),
                )
            }),
        )
        .route(
            "/unknown_total",
            get(|| async { ([(header::CONTENT_RANGE, "0-0/*")], Json(json!([{"id": 1}]))) }),
        )
        .route(
            "/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({
                        "code": "42P01",
                        "details": null,
                        "hint": null,
                        "message": "relation \"public.missing\" does not exist",
                    })),
                )
            }),
        )
        .route(
            "/gateway",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
        )
        .route("/not_json", get(|| async { "<html>" }))
        .fallback(echo)
}

/// Answers every request with `status`.
pub fn status_router(status: StatusCode) -> Router {
    Router::new().fallback(move || async move { status.into_response() })
}

/// Answers after `delay`.
pub fn slow_router(delay: Duration) -> Router {
    Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "ok"
    })
}

/// Tracks how many requests are in flight at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

async fn tracked(State(gauge): State<Arc<Gauge>>) -> &'static str {
    let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
    gauge.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    gauge.current.fetch_sub(1, Ordering::SeqCst);
    "[]"
}

pub fn gauge_router(gauge: Arc<Gauge>) -> Router {
    Router::new().fallback(tracked).with_state(gauge)
}

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
