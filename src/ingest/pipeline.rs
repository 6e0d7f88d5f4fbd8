//! Ingestion pipeline: one inbound request in, one persisted record out.
//!
//! # Responsibilities
//! - Buffer the full body and hand back an equivalent, unread request
//! - Flatten request line, addressing, headers, cookies, trailers, forms and
//!   TLS session into a [`Record`]
//! - Persist exactly one record per call
//!
//! # Design Decisions
//! - Request content never causes a failure; only an oversized body and
//!   storage faults are reported
//! - A body stream that breaks off is captured up to the break, and a gzip
//!   body that does not decode is captured as received
//! - No retries; a storage fault is returned to the caller as-is

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use http_body_util::{BodyExt, LengthLimitError};
use thiserror::Error;

use crate::config::IngestConfig;
use crate::http::request::RequestIdExt;
use crate::ingest::normalize::Inflated;
use crate::ingest::{form, normalize, tls};
use crate::net::TlsSession;
use crate::observability::metrics;
use crate::record::{Document, Record};
use crate::store::{RecordStore, StoreError};

/// Failures surfaced by [`IngestPipeline::ingest`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// The body exceeded the transport limit while streaming or inflating.
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful ingestion.
#[derive(Debug)]
pub struct Ingested {
    /// Store-assigned identifier.
    pub id: i64,
    pub correlation_id: String,
    /// False when the body stream broke off and only a prefix was captured.
    pub complete: bool,
    /// The inbound request with its body re-exposed.
    pub request: Request,
}

/// Body bytes and trailers read off the wire.
struct ReadBody {
    data: Bytes,
    trailers: Option<HeaderMap>,
    complete: bool,
}

/// Turns raw requests into persisted records.
pub struct IngestPipeline {
    store: Arc<dyn RecordStore>,
    multipart_memory: usize,
    /// Output cap for gzip inflation; `None` stores encoded bodies as-is.
    inflate_limit: Option<usize>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn RecordStore>, config: &IngestConfig) -> Self {
        Self {
            store,
            multipart_memory: config.multipart_memory_bytes,
            inflate_limit: None,
        }
    }

    /// Inflate gzip bodies before capture, up to `max_bytes` of output.
    pub fn with_decompression(mut self, max_bytes: usize) -> Self {
        self.inflate_limit = Some(max_bytes);
        self
    }

    /// Capture and persist one request.
    pub async fn ingest(&self, request: Request) -> Result<Ingested, IngestError> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.to_string();

        let read = match read_body(body).await {
            Ok(read) => read,
            Err(e) => {
                metrics::record_ingest(&method, "too_large", start, 0);
                return Err(e);
            }
        };

        let body = match self.inflate_limit {
            Some(max) if read.complete => match normalize::inflate(&parts.headers, read.data, max) {
                Inflated::Raw(raw) => raw,
                Inflated::Decoded(decoded) => decoded,
                Inflated::TooLarge => {
                    metrics::record_ingest(&method, "too_large", start, 0);
                    return Err(IngestError::BodyTooLarge);
                }
            },
            _ => read.data,
        };

        let record = self.normalize(&parts, body.clone(), read.trailers.as_ref()).await;
        let correlation_id = record.correlation_id.clone();
        let body_size = body.len();

        let id = match self.store.create(record).await {
            Ok(id) => id,
            Err(e) => {
                metrics::record_ingest(&method, "store_error", start, body_size);
                return Err(e.into());
            }
        };

        let outcome = if read.complete { "ok" } else { "partial" };
        metrics::record_ingest(&method, outcome, start, body_size);
        tracing::debug!(
            id,
            correlation_id = %correlation_id,
            method = %parts.method,
            path = %parts.uri.path(),
            body_size,
            complete = read.complete,
            "Request captured"
        );

        Ok(Ingested {
            id,
            correlation_id,
            complete: read.complete,
            request: Request::from_parts(parts, Body::from(body)),
        })
    }

    /// Build the record for a request whose body has already been read.
    pub async fn normalize(&self, parts: &Parts, body: Bytes, trailers: Option<&HeaderMap>) -> Record {
        let headers = &parts.headers;
        let session = parts.extensions.get::<TlsSession>();

        let (protocol, proto_major, proto_minor) = normalize::protocol(parts.version);
        let scheme = normalize::scheme(headers, session.is_some());
        let host = normalize::host(headers, &parts.uri);
        let request_uri = normalize::request_uri(&parts.uri);
        let (url, fragment) = normalize::full_url(&scheme, &host, &request_uri);
        let query = parts.uri.query().unwrap_or_default().to_string();

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let (ip, port) = normalize::split_host_port(&remote_addr).unwrap_or_default();

        let cookies = normalize::cookies(headers);
        let transfer_encoding = normalize::transfer_encodings(headers);
        let trailers = trailers
            .filter(|t| !t.is_empty())
            .map(normalize::header_values);

        let content_type = normalize::header_str(headers, header::CONTENT_TYPE);
        let forms = form::parse_forms(
            &parts.method,
            &query,
            &content_type,
            &body,
            self.multipart_memory,
        )
        .await;

        Record {
            method: parts.method.to_string(),
            scheme,
            protocol: protocol.to_string(),
            proto_major,
            proto_minor,
            url,
            request_uri,
            host,
            path: normalize::decoded_path(&parts.uri),
            query,
            fragment,
            remote_addr,
            ip,
            port,
            headers: Document::encode(&normalize::header_values(headers)),
            cookies: (!cookies.is_empty())
                .then(|| Document::encode(&cookies))
                .flatten(),
            trailers: trailers.and_then(|t| Document::encode(&t)),
            transfer_encoding: (!transfer_encoding.is_empty())
                .then(|| Document::encode(&transfer_encoding))
                .flatten(),
            form: forms.form.and_then(|f| Document::encode(&f)),
            post_form: forms.post_form.and_then(|f| Document::encode(&f)),
            multipart_form: forms.multipart.and_then(|f| Document::encode(&f)),
            content_length: normalize::content_length(headers),
            content_type,
            body,
            user_agent: normalize::header_str(headers, header::USER_AGENT),
            referer: normalize::header_str(headers, header::REFERER),
            tls: tls::metadata(session),
            received_at: Utc::now(),
            correlation_id: parts.correlation_id(),
        }
    }
}

/// Read every frame of `body`. A transport error other than the length
/// limit ends the read early and keeps what arrived.
async fn read_body(mut body: Body) -> Result<ReadBody, IngestError> {
    let mut data: Vec<u8> = Vec::new();
    let mut trailers: Option<HeaderMap> = None;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) if exceeds_limit(&e) => return Err(IngestError::BodyTooLarge),
            Err(e) => {
                tracing::warn!(error = %e, received = data.len(), "Request body ended early");
                return Ok(ReadBody {
                    data: Bytes::from(data),
                    trailers,
                    complete: false,
                });
            }
        };
        match frame.into_data() {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(frame) => {
                if let Ok(t) = frame.into_trailers() {
                    trailers.get_or_insert_with(HeaderMap::new).extend(t);
                }
            }
        }
    }

    Ok(ReadBody {
        data: Bytes::from(data),
        trailers,
        complete: true,
    })
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{RequestId, X_REQUEST_ID};
    use crate::record::{Cookie, StoredRecord, Values};
    use crate::store::{Page, SqliteStore};
    use crate::record::RecordSummary;
    use async_trait::async_trait;
    use axum::http;
    use axum::http::HeaderValue;
    use futures_util::stream;
    use http_body::Frame;
    use http_body_util::StreamBody;
    use std::convert::Infallible;
    use std::io::Write;

    fn pipeline() -> (IngestPipeline, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open(":memory:").unwrap());
        let pipeline = IngestPipeline::new(store.clone(), &IngestConfig::default());
        (pipeline, store)
    }

    fn with_peer(mut request: Request) -> Request {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 40123))));
        request
    }

    #[tokio::test]
    async fn test_json_post_is_captured() {
        let (pipeline, store) = pipeline();
        let mut request = http::Request::builder()
            .method("POST")
            .uri("/foo?x=1")
            .header(header::HOST, "capture.local")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        request.extensions_mut().insert(RequestId("corr-json".into()));

        let ingested = pipeline.ingest(with_peer(request)).await.unwrap();
        assert_eq!(ingested.correlation_id, "corr-json");

        let stored = store.get("corr-json").await.unwrap().unwrap();
        assert_eq!(stored.id, ingested.id);
        let r = stored.record;
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/foo");
        assert_eq!(r.query, "x=1");
        assert_eq!(r.body_size(), 7);
        assert_eq!(r.content_type, "application/json");
        assert_eq!(r.form, None);
        assert_eq!(r.post_form, None);
        assert_eq!(r.url, "http://capture.local/foo?x=1");
        assert_eq!(r.request_uri, "/foo?x=1");
        assert_eq!(r.remote_addr, "192.168.1.20:40123");
        assert_eq!(r.ip, "192.168.1.20");
        assert_eq!(r.port, "40123");
        assert_eq!(r.scheme, "http");
        assert_eq!(r.protocol, "HTTP/1.1");
        assert_eq!(r.tls, crate::record::TlsMetadata::default());
        assert_eq!(r.cookies, None);
        assert_eq!(r.trailers, None);
        assert_eq!(r.transfer_encoding, None);

        let headers: Values = r.headers.unwrap().decode().unwrap();
        assert_eq!(headers["content-type"], vec!["application/json"]);
    }

    #[tokio::test]
    async fn test_body_is_reexposed() {
        let (pipeline, _store) = pipeline();
        let request = http::Request::builder()
            .method("PUT")
            .uri("/upload")
            .body(Body::from(vec![0u8, 159, 146, 150]))
            .unwrap();

        let ingested = pipeline.ingest(request).await.unwrap();
        let replay = axum::body::to_bytes(ingested.request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&replay[..], &[0u8, 159, 146, 150]);
    }

    #[tokio::test]
    async fn test_body_size_ignores_declared_length() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .method("POST")
            .uri("/claims")
            .header(header::CONTENT_LENGTH, "1000")
            .header(X_REQUEST_ID, "corr-length")
            .body(Body::from("abc"))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-length").await.unwrap().unwrap().record;
        assert_eq!(r.content_length, 1000);
        assert_eq!(r.body_size(), 3);
    }

    #[tokio::test]
    async fn test_urlencoded_form() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .method("POST")
            .uri("/submit")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(X_REQUEST_ID, "corr-form")
            .body(Body::from("a=1&b=2"))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-form").await.unwrap().unwrap().record;
        assert_eq!(
            r.form.unwrap().decode_lenient(),
            serde_json::json!({"a": ["1"], "b": ["2"]})
        );
        assert!(r.post_form.is_some());
        assert_eq!(r.multipart_form, None);
    }

    #[tokio::test]
    async fn test_cookies_and_transfer_encoding() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .method("POST")
            .uri("/c")
            .header(header::COOKIE, "sid=abc; theme=dark")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(header::USER_AGENT, "hook-sender/2.1")
            .header(header::REFERER, "https://origin.example/")
            .header(X_REQUEST_ID, "corr-cookie")
            .body(Body::from("x"))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-cookie").await.unwrap().unwrap().record;
        let cookies: Vec<Cookie> = r.cookies.unwrap().decode().unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], Cookie { name: "sid".into(), value: "abc".into() });
        let te: Vec<String> = r.transfer_encoding.unwrap().decode().unwrap();
        assert_eq!(te, vec!["chunked"]);
        assert_eq!(r.content_length, -1);
        assert_eq!(r.user_agent, "hook-sender/2.1");
        assert_eq!(r.referer, "https://origin.example/");
    }

    #[tokio::test]
    async fn test_tls_session_is_mapped() {
        let (pipeline, store) = pipeline();
        let mut request = http::Request::builder()
            .uri("/secure")
            .header(X_REQUEST_ID, "corr-tls")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(TlsSession {
            version: Some(0x0304),
            cipher_suite: Some(0x1301),
            server_name: Some("hooks.example.com".into()),
        });

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-tls").await.unwrap().unwrap().record;
        assert!(r.tls.enabled);
        assert_eq!(r.tls.version, "TLS1.3");
        assert_eq!(r.tls.cipher, "TLS_AES_128_GCM_SHA256");
        assert_eq!(r.tls.server_name, "hooks.example.com");
        assert_eq!(r.scheme, "https");
    }

    #[tokio::test]
    async fn test_missing_peer_leaves_address_empty() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "corr-nopeer")
            .body(Body::empty())
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-nopeer").await.unwrap().unwrap().record;
        assert_eq!(r.remote_addr, "");
        assert_eq!(r.ip, "");
        assert_eq!(r.port, "");
        assert_eq!(r.body_size(), 0);
        assert!(r.headers.is_some());
    }

    fn with_trailers(data: &'static str, trailers: HeaderMap) -> Body {
        let frames: Vec<Result<Frame<Bytes>, Infallible>> = vec![
            Ok(Frame::data(Bytes::from_static(data.as_bytes()))),
            Ok(Frame::trailers(trailers)),
        ];
        Body::new(StreamBody::new(stream::iter(frames)))
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_trailers_are_captured() {
        let (pipeline, store) = pipeline();
        let mut trailers = HeaderMap::new();
        trailers.append("X-Checksum", HeaderValue::from_static("sha256=ab12"));
        trailers.append("x-checksum", HeaderValue::from_static("crc32=ff00"));
        trailers.insert("x-rows", HeaderValue::from_static("42"));

        let request = http::Request::builder()
            .method("POST")
            .uri("/stream")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(X_REQUEST_ID, "corr-trailers")
            .body(with_trailers("row-data", trailers))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-trailers").await.unwrap().unwrap().record;
        assert_eq!(&r.body[..], b"row-data");

        let stored: Values = r.trailers.unwrap().decode().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["x-checksum"], vec!["sha256=ab12", "crc32=ff00"]);
        assert_eq!(stored["x-rows"], vec!["42"]);
    }

    #[tokio::test]
    async fn test_empty_trailers_are_stored_as_null() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .method("POST")
            .uri("/stream")
            .header(X_REQUEST_ID, "corr-no-trailers")
            .body(with_trailers("x", HeaderMap::new()))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-no-trailers").await.unwrap().unwrap().record;
        assert_eq!(r.trailers, None);
    }

    #[tokio::test]
    async fn test_broken_stream_keeps_received_prefix() {
        let (pipeline, store) = pipeline();
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"first-half;")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away")),
        ];
        let request = http::Request::builder()
            .method("POST")
            .uri("/upload")
            .header(X_REQUEST_ID, "corr-broken")
            .body(Body::from_stream(stream::iter(chunks)))
            .unwrap();

        let ingested = pipeline.ingest(request).await.unwrap();
        assert!(!ingested.complete);

        let r = store.get("corr-broken").await.unwrap().unwrap().record;
        assert_eq!(&r.body[..], b"first-half;");
    }

    #[tokio::test]
    async fn test_gzip_body_is_inflated_when_enabled() {
        let (pipeline, store) = pipeline();
        let pipeline = pipeline.with_decompression(1024);
        let request = http::Request::builder()
            .method("POST")
            .uri("/gz")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(X_REQUEST_ID, "corr-gz")
            .body(Body::from(gzip(br#"{"event":"push"}"#)))
            .unwrap();

        let ingested = pipeline.ingest(request).await.unwrap();
        assert!(ingested.complete);
        let r = store.get("corr-gz").await.unwrap().unwrap().record;
        assert_eq!(&r.body[..], br#"{"event":"push"}"#);
    }

    #[tokio::test]
    async fn test_malformed_gzip_is_stored_raw() {
        let (pipeline, store) = pipeline();
        let pipeline = pipeline.with_decompression(1024);
        let request = http::Request::builder()
            .method("POST")
            .uri("/gz")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(X_REQUEST_ID, "corr-badgz")
            .body(Body::from("definitely not gzip"))
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-badgz").await.unwrap().unwrap().record;
        assert_eq!(&r.body[..], b"definitely not gzip");
        let headers: Values = r.headers.unwrap().decode().unwrap();
        assert_eq!(headers["content-encoding"], vec!["gzip"]);
    }

    #[tokio::test]
    async fn test_gzip_expansion_past_limit_is_rejected() {
        let (pipeline, store) = pipeline();
        let pipeline = pipeline.with_decompression(64);
        let request = http::Request::builder()
            .method("POST")
            .uri("/gz")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(X_REQUEST_ID, "corr-bomb")
            .body(Body::from(gzip(&[b'z'; 10_000])))
            .unwrap();

        let err = pipeline.ingest(request).await.unwrap_err();
        assert!(matches!(err, IngestError::BodyTooLarge));
        assert!(store.get("corr-bomb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_is_percent_decoded() {
        let (pipeline, store) = pipeline();
        let request = http::Request::builder()
            .method("POST")
            .uri("/a%20b/caf%C3%A9?name=caf%C3%A9")
            .header(X_REQUEST_ID, "corr-path")
            .body(Body::empty())
            .unwrap();

        pipeline.ingest(request).await.unwrap();
        let r = store.get("corr-path").await.unwrap().unwrap().record;
        assert_eq!(r.path, "/a b/café");
        assert_eq!(r.request_uri, "/a%20b/caf%C3%A9?name=caf%C3%A9");
        assert_eq!(r.query, "name=caf%C3%A9");
    }

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn create(&self, _record: Record) -> Result<i64, StoreError> {
            Err(StoreError::Poisoned)
        }

        async fn list(&self, _page: Page) -> Result<Vec<RecordSummary>, StoreError> {
            Err(StoreError::Poisoned)
        }

        async fn get(&self, _id: &str) -> Result<Option<StoredRecord>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn test_store_fault_is_reported() {
        let pipeline = IngestPipeline::new(Arc::new(FailingStore), &IngestConfig::default());
        let request = http::Request::builder()
            .uri("/")
            .body(Body::from("payload"))
            .unwrap();

        let err = pipeline.ingest(request).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::Poisoned)));
    }
}
