//! Request-shape helpers used to flatten an inbound request into a record.
//!
//! Every function here is total: malformed input yields an empty or partial
//! value, never an error.

use std::io::Read;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Uri, Version};
use flate2::read::GzDecoder;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::record::{Cookie, Values};

/// Split `"host:port"` into its parts, mirroring the usual socket-address
/// syntax (`[v6]:port` for IPv6). Returns `None` if no port can be found.
pub fn split_host_port(addr: &str) -> Option<(String, String)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return Some((host.to_string(), port.to_string()));
    }

    let (host, port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        // Bare IPv6 without brackets is ambiguous.
        return None;
    }
    Some((host.to_string(), port.to_string()))
}

/// All header values keyed by lowercase name, in arrival order.
pub fn header_values(headers: &HeaderMap) -> Values {
    let mut values = Values::new();
    for (name, value) in headers {
        values
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    values
}

/// First value of a header as text, empty when absent.
pub fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Cookies from every `Cookie` header. Pairs with an invalid name are skipped.
pub fn cookies(headers: &HeaderMap) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for line in headers.get_all(header::COOKIE) {
        let line = String::from_utf8_lossy(line.as_bytes());
        for part in line.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            if !is_token(name) {
                continue;
            }
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            cookies.push(Cookie {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }
    cookies
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// Codings listed in `Transfer-Encoding`, in order.
pub fn transfer_encodings(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .flat_map(|v| {
            String::from_utf8_lossy(v.as_bytes())
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Declared body length: the header value, `-1` for chunked bodies without
/// one, `0` otherwise.
pub fn content_length(headers: &HeaderMap) -> i64 {
    if let Some(declared) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return declared;
    }
    if transfer_encodings(headers).iter().any(|te| te == "chunked") {
        return -1;
    }
    0
}

/// Request scheme: TLS wins, then the usual forwarding headers.
pub fn scheme(headers: &HeaderMap, tls: bool) -> String {
    if tls {
        return "https".to_string();
    }
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(proto) = get("x-forwarded-proto").or_else(|| get("x-forwarded-protocol")) {
        return proto.to_ascii_lowercase();
    }
    if get("x-forwarded-ssl").is_some_and(|v| v.eq_ignore_ascii_case("on")) {
        return "https".to_string();
    }
    if let Some(scheme) = get("x-url-scheme") {
        return scheme.to_ascii_lowercase();
    }
    "http".to_string()
}

/// Protocol label with major and minor numbers.
pub fn protocol(version: Version) -> (&'static str, u8, u8) {
    match version {
        Version::HTTP_09 => ("HTTP/0.9", 0, 9),
        Version::HTTP_10 => ("HTTP/1.0", 1, 0),
        Version::HTTP_2 => ("HTTP/2.0", 2, 0),
        Version::HTTP_3 => ("HTTP/3.0", 3, 0),
        _ => ("HTTP/1.1", 1, 1),
    }
}

/// Host from the `Host` header, or the URI authority (HTTP/2).
pub fn host(headers: &HeaderMap, uri: &Uri) -> String {
    let from_header = header_str(headers, header::HOST);
    if !from_header.is_empty() {
        return from_header;
    }
    uri.authority().map(|a| a.to_string()).unwrap_or_default()
}

/// Request target exactly as it appeared on the request line.
pub fn request_uri(uri: &Uri) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Percent-decoded request path. Invalid UTF-8 after decoding is replaced
/// rather than rejected.
pub fn decoded_path(uri: &Uri) -> String {
    percent_decode_str(uri.path()).decode_utf8_lossy().into_owned()
}

/// Outcome of [`inflate`].
#[derive(Debug, PartialEq, Eq)]
pub enum Inflated {
    /// The body is not gzip-encoded, or did not decode; keep it as received.
    Raw(Bytes),
    Decoded(Bytes),
    /// Decoding produced more than the allowed number of bytes.
    TooLarge,
}

/// Inflate a `Content-Encoding: gzip` body, allowing at most `max_bytes` of
/// output. Any decode failure keeps the raw bytes.
pub fn inflate(headers: &HeaderMap, raw: Bytes, max_bytes: usize) -> Inflated {
    let encoding = header_str(headers, header::CONTENT_ENCODING);
    let encoding = encoding.trim();
    if !encoding.eq_ignore_ascii_case("gzip") && !encoding.eq_ignore_ascii_case("x-gzip") {
        return Inflated::Raw(raw);
    }

    let mut decoded = Vec::new();
    let limit = (max_bytes as u64).saturating_add(1);
    match GzDecoder::new(&raw[..]).take(limit).read_to_end(&mut decoded) {
        Ok(n) if n > max_bytes => Inflated::TooLarge,
        Ok(_) => {
            tracing::debug!(compressed = raw.len(), decoded = decoded.len(), "Inflated gzip body");
            Inflated::Decoded(Bytes::from(decoded))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Gzip body did not decode; keeping raw bytes");
            Inflated::Raw(raw)
        }
    }
}

/// Absolute URL and fragment. Falls back to the raw request target when no
/// absolute URL can be formed.
pub fn full_url(scheme: &str, host: &str, request_uri: &str) -> (String, String) {
    let candidate = if request_uri.contains("://") {
        Url::parse(request_uri)
    } else {
        Url::parse(&format!("{scheme}://{host}{request_uri}"))
    };
    match candidate {
        Ok(url) => {
            let fragment = url.fragment().unwrap_or_default().to_string();
            (url.to_string(), fragment)
        }
        Err(_) => (request_uri.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn gzip_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers
    }

    #[test]
    fn test_decoded_path() {
        let uri: Uri = "/a%20b/caf%C3%A9?q=%20".parse().unwrap();
        assert_eq!(decoded_path(&uri), "/a b/café");

        let uri: Uri = "/plain/path".parse().unwrap();
        assert_eq!(decoded_path(&uri), "/plain/path");

        let uri: Uri = "/bad%FF".parse().unwrap();
        assert_eq!(decoded_path(&uri), "/bad\u{FFFD}");
    }

    #[test]
    fn test_inflate_gzip_body() {
        let inflated = inflate(&gzip_headers(), gzip(b"hello capture"), 1024);
        assert_eq!(inflated, Inflated::Decoded(Bytes::from_static(b"hello capture")));
    }

    #[test]
    fn test_inflate_keeps_malformed_gzip() {
        let raw = Bytes::from_static(b"definitely not gzip");
        assert_eq!(inflate(&gzip_headers(), raw.clone(), 1024), Inflated::Raw(raw));
    }

    #[test]
    fn test_inflate_ignores_other_encodings() {
        let raw = gzip(b"still compressed");
        assert_eq!(inflate(&HeaderMap::new(), raw.clone(), 1024), Inflated::Raw(raw.clone()));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));
        assert_eq!(inflate(&headers, raw.clone(), 1024), Inflated::Raw(raw));
    }

    #[test]
    fn test_inflate_enforces_output_limit() {
        let body = gzip(&[b'a'; 4096]);
        assert_eq!(inflate(&gzip_headers(), body.clone(), 100), Inflated::TooLarge);
        assert!(matches!(inflate(&gzip_headers(), body, 4096), Inflated::Decoded(_)));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("10.0.0.7:51234"),
            Some(("10.0.0.7".into(), "51234".into()))
        );
        assert_eq!(
            split_host_port("[::1]:8080"),
            Some(("::1".into(), "8080".into()))
        );
        assert_eq!(split_host_port("10.0.0.7"), None);
        assert_eq!(split_host_port("::1"), None);
        assert_eq!(split_host_port(""), None);
    }

    #[test]
    fn test_header_values_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-multi", HeaderValue::from_static("one"));
        headers.append("x-multi", HeaderValue::from_static("two"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let values = header_values(&headers);
        assert_eq!(values["x-multi"], vec!["one", "two"]);
        assert_eq!(values["accept"], vec!["*/*"]);
        assert!(header_values(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("sid=abc; theme=\"dark\""));
        headers.append(header::COOKIE, HeaderValue::from_static("flag; bad name=x; ;lang=en"));

        let parsed = cookies(&headers);
        let pairs: Vec<_> = parsed.iter().map(|c| (c.name.as_str(), c.value.as_str())).collect();
        assert_eq!(
            pairs,
            vec![("sid", "abc"), ("theme", "dark"), ("flag", ""), ("lang", "en")]
        );
    }

    #[test]
    fn test_content_length_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);

        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("gzip, chunked"));
        assert_eq!(content_length(&headers), -1);
        assert_eq!(transfer_encodings(&headers), vec!["gzip", "chunked"]);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), 42);
    }

    #[test]
    fn test_scheme_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(scheme(&headers, false), "http");
        assert_eq!(scheme(&headers, true), "https");

        headers.insert("x-forwarded-ssl", HeaderValue::from_static("on"));
        assert_eq!(scheme(&headers, false), "https");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("WSS"));
        assert_eq!(scheme(&headers, false), "wss");
    }

    #[test]
    fn test_url_pieces() {
        let uri: Uri = "/foo?x=1".parse().unwrap();
        let target = request_uri(&uri);
        assert_eq!(target, "/foo?x=1");

        let (url, fragment) = full_url("http", "capture.local:8080", &target);
        assert_eq!(url, "http://capture.local:8080/foo?x=1");
        assert_eq!(fragment, "");

        let (url, _) = full_url("http", "bad host", "/x");
        assert_eq!(url, "/x");
    }

    #[test]
    fn test_host_falls_back_to_authority() {
        let uri: Uri = "https://h2.example/path".parse().unwrap();
        assert_eq!(host(&HeaderMap::new(), &uri), "h2.example");
        assert_eq!(request_uri(&uri), "https://h2.example/path");
        assert_eq!(protocol(Version::HTTP_2), ("HTTP/2.0", 2, 0));
    }
}
