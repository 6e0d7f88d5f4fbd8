//! Response envelopes and error mapping.
//!
//! # Design Decisions
//! - Every error body is `{"error": <generic message>}`
//! - Internal detail is logged where the error happens, never serialized

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Acknowledgement returned by the ingestion endpoint.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    pub request_id: i64,
}

impl IngestAck {
    pub fn ok(id: i64) -> Self {
        Self {
            status: "ok",
            request_id: id,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

/// Client-visible failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    NotFound(&'static str),
    PayloadTooLarge(&'static str),
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::NotFound(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.message() })).into_response()
    }
}
