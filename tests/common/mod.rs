//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use traffic_capture::config::CaptureConfig;
use traffic_capture::lifecycle::{startup, Shutdown};
use traffic_capture::store::SqliteStore;
use traffic_capture::HttpServer;

/// Defaults with an in-memory store and an ephemeral port.
pub fn test_config() -> CaptureConfig {
    let mut config = CaptureConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.storage.path = ":memory:".into();
    config
}

/// Fully layered router over a fresh in-memory store.
pub fn app(config: CaptureConfig) -> Router {
    let store = Arc::new(SqliteStore::open(":memory:").unwrap());
    HttpServer::new(config, store).router()
}

/// Send one request through the router.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A server running on a real socket.
pub struct LiveServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl LiveServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

pub async fn start_server(config: CaptureConfig) -> LiveServer {
    let store = startup::open_store(&config).unwrap();
    let listener = startup::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = HttpServer::new(config, store);
    let handle = tokio::spawn(server.run(listener, receiver));

    LiveServer {
        addr,
        shutdown,
        handle,
    }
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("capture-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
