// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Call Metadata Keys
//!
//! ## Purpose
//! Wire-level metadata keys shared by the HTTP edge (annotator) and the server
//! interceptor, plus the journal id that correlates one call across logs and
//! metrics.
//!
//! ## Keys
//! - `journal_id`: issued per call, echoed on the response
//! - `authorization` / `proxy-authorization`: credentials handed to validators
//! - `date`, `method`, `uri`, `body`: original HTTP request line and body
//!   (stamped by the annotator for gateway-forwarded calls)
//! - `x-forwarded-for`, `x-forwarded-host`: proxy headers
//! - `grpc-gateway`: marker identifying a gateway-forwarded call

use rand::RngCore;
use std::fmt;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use url::form_urlencoded;

/// Journal id, echoed to the caller
pub const JOURNAL_ID: &str = "journal_id";
/// Bearer credential, both gateway and native calls
pub const AUTHORIZATION: &str = "authorization";
/// Signature credential, both gateway and native calls
pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";
/// HTTP `Date` header (GMT format)
pub const DATE: &str = "date";
/// HTTP request method
pub const METHOD: &str = "method";
/// HTTP request URI (url encoded)
pub const URI: &str = "uri";
/// HTTP request body (form-urlencoded, see [`encode_body`])
pub const BODY: &str = "body";
/// `X-Forwarded-For`
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// `X-Forwarded-Host`
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Marker key stamped on gateway-forwarded calls
pub const GATEWAY_MARKER_KEY: &str = "grpc-gateway";
/// Marker value stamped on gateway-forwarded calls
pub const GATEWAY_MARKER_VALUE: &str = "callward/grpcgw/v1";

/// Metadata keys copied into journal records. Everything else is dropped.
pub const LOGGED_METADATA: [&str; 8] = [
    AUTHORIZATION,
    PROXY_AUTHORIZATION,
    DATE,
    METHOD,
    URI,
    BODY,
    X_FORWARDED_FOR,
    X_FORWARDED_HOST,
];

/// Whether the call was relayed by the HTTP transcoding gateway
pub fn forwarded_by_gateway(metadata: &MetadataMap) -> bool {
    metadata
        .get(GATEWAY_MARKER_KEY)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == GATEWAY_MARKER_VALUE)
        .unwrap_or(false)
}

/// Stamp the gateway marker onto outgoing metadata
pub fn stamp_gateway_marker(metadata: &mut MetadataMap) {
    metadata.insert(
        GATEWAY_MARKER_KEY,
        AsciiMetadataValue::from_static(GATEWAY_MARKER_VALUE),
    );
}

/// First value of an ASCII metadata key, empty when absent or not valid text
pub fn first_value(metadata: &MetadataMap, key: &str) -> String {
    metadata
        .get(key)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Encode a raw body so any byte sequence is a valid metadata value
pub fn encode_body(body: &[u8]) -> String {
    form_urlencoded::byte_serialize(body).collect()
}

/// Reverse of [`encode_body`]
///
/// An encoded body never contains `&` or `=`, so the whole input parses as a
/// single form key.
pub fn decode_body(encoded: &str) -> String {
    form_urlencoded::parse(encoded.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Split `/pkg.Service/Method` into (`pkg.Service`, `Method`)
pub fn split_full_method(full_method: &str) -> (&str, &str) {
    let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);
    match trimmed.split_once('/') {
        Some((service, method)) => (service, method),
        None => ("", trimmed),
    }
}

/// Per-call correlation id: base58 of a 16-byte random nonce
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JournalId(String);

impl JournalId {
    /// Issue a fresh journal id
    pub fn generate() -> Self {
        let mut nonce = [0u8; 16];
        if rand::rngs::OsRng.try_fill_bytes(&mut nonce).is_err() {
            rand::thread_rng().fill_bytes(&mut nonce);
        }
        Self(bs58::encode(nonce).into_string())
    }

    /// Journal id as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Journal id as a metadata value (base58 is always valid ASCII)
    pub fn to_metadata_value(&self) -> Option<AsciiMetadataValue> {
        AsciiMetadataValue::try_from(self.0.as_str()).ok()
    }
}

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
