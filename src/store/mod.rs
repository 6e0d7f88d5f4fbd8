//! Record persistence subsystem.
//!
//! # Data Flow
//! ```text
//! IngestPipeline ──create──▶ RecordStore ◀──list/get── QueryApi
//!                                 │
//!                                 ▼
//!                          sqlite.rs (requests table)
//! ```
//!
//! # Design Decisions
//! - Components receive an `Arc<dyn RecordStore>` at construction
//! - The store owns its connection; open at startup, close at shutdown
//! - No retries: a fault is returned to the caller immediately

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{Record, RecordSummary, StoredRecord};

pub use sqlite::SqliteStore;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("storage connection lock poisoned")]
    Poisoned,

    #[error("unsupported schema version {found} (expected {expected})")]
    Schema { found: i32, expected: i32 },

    #[error("store is still shared and cannot be closed")]
    InUse,
}

/// A validated page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// Persistence boundary for captured records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record and return its store-assigned identifier.
    async fn create(&self, record: Record) -> Result<i64, StoreError>;

    /// Records with a non-empty correlation id, most recent first.
    async fn list(&self, page: Page) -> Result<Vec<RecordSummary>, StoreError>;

    /// Fetch one record by exact correlation id.
    async fn get(&self, correlation_id: &str) -> Result<Option<StoredRecord>, StoreError>;
}
