//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack, surface composition)
//!     → request.rs (assign correlation id)
//!     → ingest pipeline or query handlers
//!     → response.rs (ack / error envelopes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use response::{ApiError, IngestAck};
pub use server::{AppState, HttpServer};
