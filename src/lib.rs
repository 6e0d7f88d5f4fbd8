//! Traffic capture service library.

pub mod config;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod query;
pub mod record;
pub mod store;

pub use config::CaptureConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
