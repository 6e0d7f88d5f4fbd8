//! Typed client for a running capture service.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the list view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub request_id: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub ip: String,
    pub content_type: String,
    pub body_size: i64,
    pub tls_enabled: bool,
    pub received_at: String,
}

/// A page of captured requests with the window the server applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPage {
    pub items: Vec<RequestSummary>,
    pub count: usize,
    pub limit: u32,
    pub offset: u64,
}

/// Full record as returned by the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDetail {
    pub request_id: String,
    pub received_at: String,
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

pub struct CaptureClient {
    client: Client,
    base_url: String,
}

impl CaptureClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one page of captured requests, most recent first.
    ///
    /// `None` leaves the parameter to the server default.
    pub async fn list(
        &self,
        limit: Option<u32>,
        offset: Option<u64>,
    ) -> Result<RequestPage, Box<dyn std::error::Error>> {
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/api/requests", self.base_url))
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(format!("Capture service returned error status {}: {}", status, text).into());
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Fetch one captured request by correlation id. `Ok(None)` when unknown.
    pub async fn get(&self, request_id: &str) -> Result<Option<RequestDetail>, Box<dyn std::error::Error>> {
        let url = reqwest::Url::parse(&format!("{}/api/requests/", self.base_url))?.join(request_id)?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(format!("Capture service returned error status {}: {}", status, text).into());
        }

        Ok(Some(serde_json::from_str(&text)?))
    }
}
