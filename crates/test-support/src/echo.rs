//! In-process upstream API that records and echoes every request.
//!
//! Routes:
//! - `GET /__bytes/{n}` responds with `n` bytes of `x`
//! - `GET /__binary` responds with bytes that are not valid UTF-8
//! - `GET /__slow` sleeps for 30s before answering
//! - anything else is recorded and echoed back as JSON with status 200 (or the value of the
//!   `x-echo-status` request header)

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One request as seen by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lower-cased header names; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// `path?query` as it arrived.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }
}

type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// A running echo upstream; shuts down when dropped.
pub struct EchoUpstream {
    base_url: String,
    requests: Recorded,
    shutdown: Option<oneshot::Sender<()>>,
}

impl EchoUpstream {
    /// Bind `127.0.0.1:0` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> anyhow::Result<Self> {
        let requests: Recorded = Arc::default();

        let app = Router::new()
            .route("/__bytes/{n}", get(bytes_handler))
            .route("/__binary", get(binary_handler))
            .route("/__slow", get(slow_handler))
            .fallback(echo_handler)
            .with_state(requests.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind echo upstream")?;
        let addr = listener.local_addr().context("echo upstream local_addr")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
            shutdown: Some(shutdown_tx),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// All requests recorded so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Drop for EchoUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn echo_handler(
    State(requests): State<Recorded>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        header_map
            .entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }

    let recorded = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: header_map,
        body: body.to_vec(),
    };

    let status = recorded
        .header("x-echo-status")
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);

    let headers_json: Map<String, Value> = recorded
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let payload = json!({
        "method": recorded.method,
        "path": recorded.path,
        "query": recorded.query,
        "headers": headers_json,
        "body": String::from_utf8_lossy(&recorded.body),
    });

    requests.lock().push(recorded);
    (status, axum::Json(payload))
}

async fn bytes_handler(Path(n): Path<usize>) -> String {
    "x".repeat(n)
}

async fn binary_handler() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        vec![0xff_u8, 0xfe, 0x00, 0x01],
    )
}

async fn slow_handler() -> &'static str {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "late"
}
