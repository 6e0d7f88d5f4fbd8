//! Read side of the capture store.
//!
//! # Responsibilities
//! - Normalize pagination input (invalid values fall back, never fail)
//! - Decode every stored sub-document independently and tolerantly
//! - Render a bounded text preview of the raw body
//!
//! # Design Decisions
//! - The preview is a byte cut; a multi-byte character straddling the cut
//!   is rendered with a replacement character
//! - Not-found is `Ok(None)`, only storage faults are errors

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::observability::metrics;
use crate::record::document::decode_optional;
use crate::record::{RecordSummary, StoredRecord};
use crate::store::{Page, RecordStore, StoreError};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 500;
pub const PREVIEW_BYTES: usize = 2048;
pub const TRUNCATION_MARKER: &str = "\n… (truncated)";

/// Build a page window from a raw query string.
///
/// The first occurrence of each parameter wins. `limit` outside `1..=500`
/// becomes 100, a negative or unparsable `offset` becomes 0.
pub fn parse_page(raw_query: Option<&str>) -> Page {
    let mut limit = None;
    let mut offset = None;

    for (key, value) in url::form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "limit" if limit.is_none() => limit = Some(value.into_owned()),
            "offset" if offset.is_none() => offset = Some(value.into_owned()),
            _ => {}
        }
    }

    let limit = limit
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| (1..=i64::from(MAX_LIMIT)).contains(n))
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_LIMIT);
    let offset = offset
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);

    Page { limit, offset }
}

/// Text rendering of a body, cut at [`PREVIEW_BYTES`].
pub fn body_preview(body: &[u8]) -> String {
    if body.len() <= PREVIEW_BYTES {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut preview = String::from_utf8_lossy(&body[..PREVIEW_BYTES]).into_owned();
    preview.push_str(TRUNCATION_MARKER);
    preview
}

/// One page of the list view.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub items: Vec<RecordSummary>,
    pub count: usize,
    pub limit: u32,
    pub offset: u64,
}

/// Fully decoded record for the detail view.
#[derive(Debug, Serialize)]
pub struct RecordDetail {
    pub request_id: String,
    pub received_at: DateTime<Utc>,
    pub method: String,
    pub scheme: String,
    pub http_version: String,
    pub proto_major: u8,
    pub proto_minor: u8,
    pub url: String,
    pub request_uri: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
    pub remote_addr: String,
    pub ip: String,
    pub port: String,

    pub content_type: String,
    pub content_length: i64,
    pub body_size: i64,
    pub user_agent: String,
    pub referer: String,

    pub tls_enabled: bool,
    pub tls_version: String,
    pub tls_cipher: String,
    pub tls_server_name: String,

    pub header: Value,
    pub cookies: Value,
    pub trailer: Value,
    pub transfer_encoding: Value,
    pub form: Value,
    pub post_form: Value,
    pub multipart_form: Value,
    pub body_preview: String,
}

impl From<StoredRecord> for RecordDetail {
    fn from(stored: StoredRecord) -> Self {
        let r = stored.record;
        let body_size = r.body_size();
        Self {
            header: decode_optional(r.headers.as_ref()),
            cookies: decode_optional(r.cookies.as_ref()),
            trailer: decode_optional(r.trailers.as_ref()),
            transfer_encoding: decode_optional(r.transfer_encoding.as_ref()),
            form: decode_optional(r.form.as_ref()),
            post_form: decode_optional(r.post_form.as_ref()),
            multipart_form: decode_optional(r.multipart_form.as_ref()),
            body_preview: body_preview(&r.body),
            request_id: r.correlation_id,
            received_at: r.received_at,
            method: r.method,
            scheme: r.scheme,
            http_version: r.protocol,
            proto_major: r.proto_major,
            proto_minor: r.proto_minor,
            url: r.url,
            request_uri: r.request_uri,
            host: r.host,
            path: r.path,
            query: r.query,
            fragment: r.fragment,
            remote_addr: r.remote_addr,
            ip: r.ip,
            port: r.port,
            content_type: r.content_type,
            content_length: r.content_length,
            body_size,
            user_agent: r.user_agent,
            referer: r.referer,
            tls_enabled: r.tls.enabled,
            tls_version: r.tls.version,
            tls_cipher: r.tls.cipher,
            tls_server_name: r.tls.server_name,
        }
    }
}

/// Query operations over a [`RecordStore`].
#[derive(Clone)]
pub struct QueryApi {
    store: Arc<dyn RecordStore>,
}

impl QueryApi {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, page: Page) -> Result<ListResponse, StoreError> {
        let items = match self.store.list(page).await {
            Ok(items) => items,
            Err(e) => {
                metrics::record_query("list", "error");
                return Err(e);
            }
        };
        metrics::record_query("list", "ok");

        Ok(ListResponse {
            count: items.len(),
            items,
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn get(&self, correlation_id: &str) -> Result<Option<RecordDetail>, StoreError> {
        let stored = match self.store.get(correlation_id).await {
            Ok(stored) => stored,
            Err(e) => {
                metrics::record_query("get", "error");
                return Err(e);
            }
        };
        metrics::record_query("get", if stored.is_some() { "ok" } else { "not_found" });
        Ok(stored.map(RecordDetail::from))
    }
}
