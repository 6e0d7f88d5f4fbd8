//! Correlation-id assignment.
//!
//! # Responsibilities
//! - Give every request a correlation id (UUID v4) as early as possible
//! - Reuse a non-empty inbound `x-request-id` instead of generating one
//! - Echo the id on the response header
//!
//! # Design Decisions
//! - The assigned id lives in request extensions as [`RequestId`]; inbound
//!   headers are left exactly as received
//! - When no id was assigned, readers fall back to the inbound header. A
//!   client can therefore choose its own id; ids are not authenticated

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id assigned to the request and its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn inbound(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Middleware assigning a [`RequestId`] and setting it on the response.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = inbound(request.headers())
        .map(RequestId)
        .unwrap_or_else(RequestId::generate);
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Correlation-id lookup on request heads.
pub trait RequestIdExt {
    /// The assigned id, else the inbound `x-request-id` header, else empty.
    fn correlation_id(&self) -> String;
}

impl RequestIdExt for Parts {
    fn correlation_id(&self) -> String {
        self.extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| inbound(&self.headers))
            .unwrap_or_default()
    }
}
