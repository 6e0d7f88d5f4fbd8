//! Record model subsystem.
//!
//! # Data Flow
//! ```text
//! ingest pipeline
//!     → Record (model.rs, sub-documents encoded via document.rs)
//!     → RecordStore::create
//!
//! RecordStore::get / list
//!     → StoredRecord / RecordSummary
//!     → query service (document.rs lenient decode)
//! ```

pub mod document;
pub mod model;

pub use document::{Cookie, Document, Values};
pub use model::{Record, RecordSummary, StoredRecord, TlsMetadata};
