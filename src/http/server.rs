//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router for the configured surface (full or ingest-only)
//! - Configure HTTP/1.1 and HTTP/2 support, plaintext or TLS
//! - Wire up middleware (panic recovery, request ID, tracing, compression,
//!   limits, timeout)
//! - Bind server to listener and drain on shutdown

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRef, Request, State},
    middleware,
    routing::{any, get, get_service, MethodRouter},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    limit::RequestBodyLimitLayer,
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
    CompressionLevel,
};

use crate::config::{CaptureConfig, SurfaceMode};
use crate::http::request::{assign_request_id, RequestId};
use crate::http::response::{ApiError, IngestAck};
use crate::ingest::{IngestError, IngestPipeline};
use crate::net::tls::load_tls_config;
use crate::net::SessionAcceptor;
use crate::query::{handlers, QueryApi};
use crate::store::RecordStore;

/// How long in-flight TLS connections may drain after shutdown.
const TLS_DRAIN_SECS: u64 = 10;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub query: QueryApi,
}

impl FromRef<AppState> for Arc<IngestPipeline> {
    fn from_ref(state: &AppState) -> Self {
        state.pipeline.clone()
    }
}

impl FromRef<AppState> for QueryApi {
    fn from_ref(state: &AppState) -> Self {
        state.query.clone()
    }
}

/// HTTP server for the capture service.
pub struct HttpServer {
    router: Router,
    config: CaptureConfig,
}

impl HttpServer {
    /// Create a new HTTP server over `store`.
    pub fn new(config: CaptureConfig, store: Arc<dyn RecordStore>) -> Self {
        let mut pipeline = IngestPipeline::new(store.clone(), &config.ingest);
        if config.middleware.decompression {
            pipeline = pipeline.with_decompression(config.limits.max_body_bytes);
        }
        let state = AppState {
            pipeline: Arc::new(pipeline),
            query: QueryApi::new(store),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &CaptureConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", any(ingest))
            .route("/{*path}", any(ingest));

        if config.surface.mode == SurfaceMode::Full {
            router = router
                .route("/api/requests", get(handlers::list_requests).fallback(ingest))
                .route("/api/requests/{id}", get(handlers::get_request).fallback(ingest));

            if let Some(dir) = &config.surface.ui_dir {
                router = Self::mount_ui(router, dir, &state);
            }
        }

        let mut router = router
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes));

        if config.middleware.compression {
            router = router.layer(CompressionLayer::new().quality(CompressionLevel::Precise(5)));
        }

        router = router.layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.as_str().to_owned())
                .unwrap_or_default();
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }));

        if config.middleware.request_id {
            router = router.layer(middleware::from_fn(assign_request_id));
        }

        router.layer(CatchPanicLayer::new())
    }

    /// `/ui` serves the single-page index; `/static` serves the asset directory.
    /// Non-GET methods on these paths are still captured.
    fn mount_ui(router: Router<AppState>, dir: &Path, state: &AppState) -> Router<AppState> {
        let index: PathBuf = dir.join("index.html");
        let assets: MethodRouter<AppState> = get_service(ServeDir::new(dir)).fallback(ingest);
        let assets: MethodRouter = assets.with_state(state.clone());

        router
            .route("/ui", get_service(ServeFile::new(&index)).fallback(ingest))
            .route("/ui/{*rest}", get_service(ServeFile::new(&index)).fallback(ingest))
            .nest_service("/static", assets)
    }

    /// Router with every layer applied, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, accepting connections on `listener`.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        let Self { router, config } = self;
        let app = router.into_make_service_with_connect_info::<SocketAddr>();

        match &config.listener.tls {
            None => {
                tracing::info!(address = %addr, mode = ?config.surface.mode, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal(shutdown))
                    .await?;
            }
            Some(tls) => {
                let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                tracing::info!(address = %addr, mode = ?config.surface.mode, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal(shutdown).await;
                    drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
                });

                axum_server::from_tcp(listener.into_std()?)
                    .acceptor(SessionAcceptor::new(rustls))
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// Catch-all capture handler.
async fn ingest(
    State(pipeline): State<Arc<IngestPipeline>>,
    request: Request,
) -> Result<Json<IngestAck>, ApiError> {
    match pipeline.ingest(request).await {
        Ok(ingested) => Ok(Json(IngestAck::ok(ingested.id))),
        Err(IngestError::BodyTooLarge) => Err(ApiError::PayloadTooLarge("request body too large")),
        Err(IngestError::Store(e)) => {
            tracing::error!(error = %e, "Failed to persist captured request");
            Err(ApiError::Internal("Failed to ingest request"))
        }
    }
}

/// Wait for the shutdown coordinator to fire.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
    tracing::info!("Shutdown signal received");
}
