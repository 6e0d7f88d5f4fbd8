//! TLS version and cipher-suite naming.
//!
//! Unknown codes are an expected outcome and resolve to `"Unknown"`.

use crate::net::tls::TlsSession;
use crate::record::TlsMetadata;

pub const UNKNOWN: &str = "Unknown";

/// Protocol version code to label.
pub fn version_name(code: u16) -> &'static str {
    match code {
        0x0301 => "TLS1.0",
        0x0302 => "TLS1.1",
        0x0303 => "TLS1.2",
        0x0304 => "TLS1.3",
        _ => UNKNOWN,
    }
}

/// Cipher-suite code to IANA name.
pub fn cipher_suite_name(code: u16) -> &'static str {
    match code {
        // TLS 1.3
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        // TLS 1.2
        0xc02b => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xc02c => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xc02f => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xc030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xcca8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xcca9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        _ => UNKNOWN,
    }
}

/// Build record metadata from a captured session; plaintext yields the zero value.
pub fn metadata(session: Option<&TlsSession>) -> TlsMetadata {
    let Some(session) = session else {
        return TlsMetadata::default();
    };

    TlsMetadata {
        enabled: true,
        version: session.version.map(version_name).unwrap_or(UNKNOWN).to_string(),
        cipher: session
            .cipher_suite
            .map(cipher_suite_name)
            .unwrap_or(UNKNOWN)
            .to_string(),
        server_name: session.server_name.clone().unwrap_or_default(),
    }
}
