//! Form and multipart decoding.
//!
//! # Responsibilities
//! - Decide whether a content type carries form data
//! - Decode urlencoded query and body values
//! - Decode multipart text fields, skipping uploaded files
//!
//! # Design Decisions
//! - Decoding never fails the request; a broken multipart body leaves the
//!   multipart field unset and the other forms intact
//! - Multipart text values are capped by a memory threshold; exceeding it
//!   counts as a parse failure

use std::convert::Infallible;

use axum::body::Bytes;
use axum::http::Method;
use url::form_urlencoded;

use crate::record::Values;

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Default in-memory threshold for multipart text values (32 MiB).
pub const DEFAULT_MULTIPART_MEMORY: usize = 32 << 20;

/// Decoded form views of one request. Each is `None` when not produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedForms {
    /// Body values followed by query-string values.
    pub form: Option<Values>,
    /// Body values only.
    pub post_form: Option<Values>,
    /// Multipart text fields only.
    pub multipart: Option<Values>,
}

/// True when the content type announces urlencoded or multipart form data.
pub fn is_form_content(content_type: &str) -> bool {
    content_type.contains(URLENCODED) || content_type.contains(MULTIPART)
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decode `a=1&b=2` style input, preserving value order per key.
pub fn parse_urlencoded(input: &[u8]) -> Values {
    let mut values = Values::new();
    for (key, value) in form_urlencoded::parse(input) {
        values.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    values
}

fn append(target: &mut Values, source: &Values) {
    for (key, vals) in source {
        target.entry(key.clone()).or_default().extend(vals.iter().cloned());
    }
}

/// Decode every form view of a request whose content type carries form data.
///
/// Returns the default (all `None`) for any other content type.
pub async fn parse_forms(
    method: &Method,
    query: &str,
    content_type: &str,
    body: &Bytes,
    memory_limit: usize,
) -> ParsedForms {
    if !is_form_content(content_type) {
        return ParsedForms::default();
    }

    let media = media_type(content_type);
    let body_methods = [Method::POST, Method::PUT, Method::PATCH];

    let mut post_form = if media == URLENCODED && body_methods.contains(method) {
        parse_urlencoded(body)
    } else {
        Values::new()
    };
    let mut form = post_form.clone();
    append(&mut form, &parse_urlencoded(query.as_bytes()));

    let mut multipart = None;
    if media == MULTIPART {
        match parse_multipart(content_type, body.clone(), memory_limit).await {
            Ok(fields) => {
                append(&mut form, &fields);
                append(&mut post_form, &fields);
                multipart = Some(fields);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Multipart body not decoded");
            }
        }
    }

    ParsedForms {
        form: Some(form),
        post_form: Some(post_form),
        multipart,
    }
}

/// Reasons a multipart body could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error(transparent)]
    Malformed(#[from] multer::Error),

    #[error("multipart text values exceed {0} bytes")]
    TooLarge(usize),
}

/// Decode multipart text fields. Parts carrying a filename are skipped.
pub async fn parse_multipart(
    content_type: &str,
    body: Bytes,
    memory_limit: usize,
) -> Result<Values, MultipartError> {
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut values = Values::new();
    let mut used = 0usize;
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().filter(|n| !n.is_empty()).map(str::to_owned) else {
            continue;
        };
        let text = field.text().await?;
        used = used.saturating_add(text.len());
        if used > memory_limit {
            return Err(MultipartError::TooLarge(memory_limit));
        }
        values.entry(name).or_default().push(text);
    }
    Ok(values)
}
