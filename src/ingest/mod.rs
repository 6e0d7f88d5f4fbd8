//! Ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! any method, any path
//!     → pipeline.rs (buffer body + trailers, restore request)
//!     → normalize.rs (request line, addressing, headers, cookies)
//!     → form.rs (urlencoded / multipart text values)
//!     → tls.rs (session → version and cipher names)
//!     → RecordStore::create
//! ```
//!
//! # Design Decisions
//! - Request content is never a reason to fail; anything unparsable is
//!   left empty or null in the record
//! - The pipeline owns an explicit store handle given at construction

pub mod form;
pub mod normalize;
pub mod pipeline;
pub mod tls;

pub use pipeline::{IngestError, Ingested, IngestPipeline};
