//! Query API over captured records.
//!
//! # Data Flow
//! ```text
//! GET /api/requests?limit&offset
//!     → handlers.rs (extract raw query)
//!     → service.rs (normalize page, store.list)
//!     → { items, count, limit, offset }
//!
//! GET /api/requests/{id}
//!     → handlers.rs
//!     → service.rs (store.get, tolerant decode, body preview)
//!     → detail document, or 404
//! ```

pub mod handlers;
pub mod service;

pub use service::{parse_page, ListResponse, QueryApi, RecordDetail};
