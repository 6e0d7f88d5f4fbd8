//! Traffic capture service
//!
//! Accepts any HTTP request on any path, records everything about it, and
//! serves the recordings back through a small JSON API.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                 TRAFFIC CAPTURE                   │
//!                         │                                                   │
//!     Client Request      │  ┌──────────┐   ┌───────────┐   ┌──────────────┐  │
//!     ────────────────────┼─▶│ net/tls  │──▶│   http    │──▶│    ingest    │  │
//!                         │  │ acceptor │   │  server   │   │   pipeline   │  │
//!                         │  └──────────┘   └─────┬─────┘   └──────┬───────┘  │
//!                         │                       │                │ create   │
//!                         │                       ▼                ▼          │
//!     Query Response      │                ┌────────────┐   ┌──────────────┐  │
//!     ◀───────────────────┼────────────────│   query    │◀──│ record store │  │
//!                         │                │    api     │   │   (sqlite)   │  │
//!                         │                └────────────┘   └──────────────┘  │
//!                         │                                                   │
//!                         │   config · lifecycle · observability              │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use traffic_capture::config::{load_config, CaptureConfig, SurfaceMode};
use traffic_capture::lifecycle::{signals, startup, Shutdown};
use traffic_capture::observability::{logging, metrics};
use traffic_capture::HttpServer;

#[derive(Parser)]
#[command(name = "traffic-capture")]
#[command(about = "Records every HTTP request it receives", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Capture only; do not expose the query API or UI
    #[arg(long)]
    ingest_only: bool,
}

impl Args {
    fn apply(self, mut config: CaptureConfig) -> CaptureConfig {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(db) = self.db {
            config.storage.path = db;
        }
        if self.ingest_only {
            config.surface.mode = SurfaceMode::IngestOnly;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CaptureConfig::default(),
    };
    let config = args.apply(config);
    traffic_capture::config::validate_config(&config)
        .map_err(traffic_capture::config::ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!("traffic-capture v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        storage = %config.storage.path.display(),
        mode = ?config.surface.mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = startup::open_store(&config)?;
    let listener = startup::bind(&config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, store.clone());
    let result = server.run(listener, shutdown.subscribe()).await;

    match std::sync::Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => tracing::warn!("Record store still shared at exit; leaving it to drop"),
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
