//! Sub-document encoding at the storage boundary.
//!
//! Headers, cookies, forms and friends are persisted as JSON text. A
//! [`Document`] is either produced by [`Document::encode`] (always valid JSON)
//! or loaded verbatim from storage with [`Document::from_raw`], in which case
//! nothing is assumed about its contents until it is decoded.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered multi-valued mapping used for headers, trailers and forms.
pub type Values = BTreeMap<String, Vec<String>>;

/// A cookie as sent by the client in a `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Serialized sub-document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(String);

impl Document {
    /// Serialize a value into a document.
    ///
    /// Returns `None` if serialization fails, so a field is either absent or
    /// holds complete JSON.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Option<Self> {
        match serde_json::to_string(value) {
            Ok(text) => Some(Self(text)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode sub-document");
                None
            }
        }
    }

    /// Wrap text loaded from storage without validating it.
    pub fn from_raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    /// Decode as generic JSON, degrading to the raw text if it does not parse.
    pub fn decode_lenient(&self) -> Value {
        serde_json::from_str(&self.0).unwrap_or_else(|_| Value::String(self.0.clone()))
    }
}

/// Lenient decode of an optional document: absent or empty stays `null`.
pub fn decode_optional(document: Option<&Document>) -> Value {
    match document {
        Some(doc) if !doc.as_str().is_empty() => doc.decode_lenient(),
        _ => Value::Null,
    }
}
