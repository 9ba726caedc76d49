//! Local HTTP stub server for integration and e2e tests.
//!
//! Binds an ephemeral localhost port and serves a handful of deterministic
//! endpoints: a plain 200, a 201, an echo, and a responder whose delay is
//! set per request (`/slow?ms=200`). Every request is counted per path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::time::{Duration, sleep};

pub const PATH_OK: &str = "/ok";
pub const PATH_CREATED: &str = "/created";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_SLOW: &str = "/slow";

/// Requests seen per path, shared between the server task and the test.
#[derive(Debug, Clone, Default)]
pub struct HitCounter(Arc<Mutex<HashMap<String, u64>>>);

impl HitCounter {
    fn record(&self, path: &str) {
        let mut hits = self.0.lock().unwrap_or_else(|p| p.into_inner());
        *hits.entry(path.to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn for_path(&self, path: &str) -> u64 {
        let hits = self.0.lock().unwrap_or_else(|p| p.into_inner());
        hits.get(path).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        let hits = self.0.lock().unwrap_or_else(|p| p.into_inner());
        hits.values().sum()
    }
}

async fn count_hits(State(hits): State<HitCounter>, request: Request, next: Next) -> Response {
    hits.record(request.uri().path());
    next.run(request).await
}

async fn handle_ok() -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "hi")
}

async fn handle_created() -> (StatusCode, &'static str) {
    (StatusCode::CREATED, "created")
}

async fn handle_echo(body: Bytes) -> Bytes {
    body
}

#[derive(Debug, Deserialize)]
struct SlowParams {
    ms: Option<u64>,
}

async fn handle_slow(Query(params): Query<SlowParams>) -> &'static str {
    sleep(Duration::from_millis(params.ms.unwrap_or(50))).await;
    "slow"
}

pub fn router(hits: HitCounter) -> Router {
    Router::new()
        .route(PATH_OK, get(handle_ok))
        .route(PATH_CREATED, post(handle_created))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_SLOW, get(handle_slow))
        .layer(middleware::from_fn_with_state(hits, count_hits))
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    hits: HitCounter,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let hits = HitCounter::default();
        let app = router(hits.clone());

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            hits,
            task: Some(task),
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn hits(&self) -> &HitCounter {
        &self.hits
    }

    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
