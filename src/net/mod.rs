//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plaintext: axum::serve
//!     → TLS: tls.rs SessionAcceptor (rustls handshake)
//!         → TlsSession attached to every request on the connection
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and enabled by configuring a certificate and key
//! - Session metadata travels as a request extension, never as global state

pub mod tls;

pub use tls::{SessionAcceptor, TlsSession};
