//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the record store named in configuration
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Store opens before the listener binds (traffic only when ready)

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::CaptureConfig;
use crate::store::{SqliteStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Open the SQLite store at the configured path.
pub fn open_store(config: &CaptureConfig) -> Result<Arc<SqliteStore>, StartupError> {
    let store = SqliteStore::open(&config.storage.path)?;
    Ok(Arc::new(store))
}

/// Bind the capture listener.
pub async fn bind(config: &CaptureConfig) -> Result<TcpListener, StartupError> {
    let address = &config.listener.bind_address;
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })
}
