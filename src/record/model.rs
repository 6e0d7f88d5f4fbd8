//! The normalized entity persisted per captured request.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::document::Document;

/// Negotiated TLS parameters. Zero-valued when the connection was plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMetadata {
    pub enabled: bool,
    pub version: String,
    pub cipher: String,
    pub server_name: String,
}

/// One captured HTTP request. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    // Request line and URL
    pub method: String,
    pub scheme: String,
    pub protocol: String,
    pub proto_major: u8,
    pub proto_minor: u8,
    pub url: String,
    pub request_uri: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub fragment: String,

    // Remote addressing
    pub remote_addr: String,
    pub ip: String,
    pub port: String,

    // Sub-documents
    pub headers: Option<Document>,
    pub cookies: Option<Document>,
    pub trailers: Option<Document>,
    pub transfer_encoding: Option<Document>,
    pub form: Option<Document>,
    pub post_form: Option<Document>,
    pub multipart_form: Option<Document>,

    // Body
    pub body: Bytes,
    /// As claimed by the sender; `-1` when unknown.
    pub content_length: i64,
    pub content_type: String,

    pub user_agent: String,
    pub referer: String,

    pub tls: TlsMetadata,

    pub received_at: DateTime<Utc>,
    pub correlation_id: String,
}

impl Record {
    /// Number of body bytes actually read.
    pub fn body_size(&self) -> i64 {
        i64::try_from(self.body.len()).unwrap_or(i64::MAX)
    }
}

/// A record together with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub record: Record,
}

/// Lightweight projection used by the list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub request_id: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub ip: String,
    pub content_type: String,
    pub body_size: i64,
    pub tls_enabled: bool,
    pub received_at: DateTime<Utc>,
}
