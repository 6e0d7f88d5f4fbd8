//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define capture metrics (ingest volume, latency, body sizes, queries)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `capture_ingested_total` (counter): ingestions by method, outcome
//! - `capture_ingest_duration_seconds` (histogram): body read plus persist
//! - `capture_body_bytes` (histogram): bytes read per captured body
//! - `capture_queries_total` (counter): query calls by endpoint, outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and
//!   metrics-disabled deployments pay nothing
//! - Labels stay low-cardinality (no paths, no ids); extension methods
//!   collapse into `OTHER`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const INGESTED_TOTAL: &str = "capture_ingested_total";
pub const INGEST_DURATION: &str = "capture_ingest_duration_seconds";
pub const BODY_BYTES: &str = "capture_body_bytes";
pub const QUERIES_TOTAL: &str = "capture_queries_total";

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!(INGESTED_TOTAL, "Requests passed through ingestion");
    describe_histogram!(
        INGEST_DURATION,
        metrics::Unit::Seconds,
        "Time spent reading and persisting a request"
    );
    describe_histogram!(BODY_BYTES, metrics::Unit::Bytes, "Captured body sizes");
    describe_counter!(QUERIES_TOTAL, "Query API calls");
}

/// Fixed label for a request method.
pub fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => "OTHER",
    }
}

/// Record one ingestion attempt.
pub fn record_ingest(method: &str, outcome: &'static str, start: Instant, body_bytes: usize) {
    counter!(INGESTED_TOTAL, "method" => method_label(method), "outcome" => outcome).increment(1);
    histogram!(INGEST_DURATION).record(start.elapsed().as_secs_f64());
    if matches!(outcome, "ok" | "partial") {
        histogram!(BODY_BYTES).record(body_bytes as f64);
    }
}

/// Record one query API call.
pub fn record_query(endpoint: &'static str, outcome: &'static str) {
    counter!(QUERIES_TOTAL, "endpoint" => endpoint, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_methods_keep_their_label() {
        for method in ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "CONNECT", "TRACE"] {
            assert_eq!(method_label(method), method);
        }
    }

    #[test]
    fn test_extension_methods_share_one_label() {
        assert_eq!(method_label("PROPFIND"), "OTHER");
        assert_eq!(method_label("get"), "OTHER");
        assert_eq!(method_label(""), "OTHER");
    }

    #[test]
    fn test_ingest_series_stay_bounded() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            for i in 0..200 {
                record_ingest(&format!("X{i}"), "ok", Instant::now(), 0);
            }
            record_ingest("POST", "ok", Instant::now(), 0);
        });

        let rendered = handle.render();
        let series: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with(INGESTED_TOTAL))
            .collect();
        assert_eq!(series.len(), 2);
        assert!(series.iter().any(|line| line.contains(r#"method="OTHER""#) && line.ends_with(" 200")));
        assert!(series.iter().any(|line| line.contains(r#"method="POST""#)));
    }
}
