// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Journal - Structured Audit Records
//!
//! ## Purpose
//! One audit record per journaled call: request (transport, method,
//! allow-listed metadata, message), response (code, message, error details,
//! message), outcome and cost.
//!
//! ## Metadata Allow-List
//! Only the keys in [`LOGGED_METADATA`](crate::metadata::LOGGED_METADATA) are
//! copied into a record. Any other inbound header is dropped to bound record
//! size and keep unrelated metadata out of the logs.
//!
//! ## Sinks
//! Records are handed to a [`JournalSink`]. [`TracingJournalSink`] (default)
//! logs them through `tracing`; persistence is left to whatever subscriber or
//! sink the application installs.

use crate::metadata::{self, JournalId};
use crate::recovery;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};

/// Request half of a journal record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalRequest {
    /// Whether the call came through the HTTP gateway
    pub is_http: bool,
    /// Full method (`/pkg.Service/Method`)
    pub method: String,
    /// Allow-listed request metadata (first value per key)
    pub metadata: BTreeMap<String, String>,
    /// Request message
    pub payload: Option<Value>,
}

/// Response half of a journal record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalResponse {
    /// Canonical status code name (`OK`, `PermissionDenied`, `Canceled`, ...)
    pub code: String,
    /// Status message (empty on success)
    pub message: String,
    /// Decoded error details
    pub details: Vec<Value>,
    /// Response message (absent on failure)
    pub payload: Option<Value>,
}

/// Audit record for one call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalRecord {
    /// Journal id of the call
    pub id: String,
    /// Request side
    pub request: JournalRequest,
    /// Response side
    pub response: JournalResponse,
    /// Whether the call returned OK
    pub success: bool,
    /// Wall-clock cost of the call
    pub cost_seconds: f64,
}

impl JournalRecord {
    /// Render the record as a JSON object
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Request side captured before the handler consumes the request
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestSnapshot {
    pub is_http: bool,
    pub metadata: BTreeMap<String, String>,
    pub payload: Option<Value>,
}

impl RequestSnapshot {
    /// Capture allow-listed metadata and the request message
    pub fn capture<M: Serialize>(metadata: &MetadataMap, message: &M) -> Self {
        let is_http = metadata::forwarded_by_gateway(metadata);
        let mut logged = BTreeMap::new();
        for key in metadata::LOGGED_METADATA {
            if let Some(value) = metadata.get(key).and_then(|value| value.to_str().ok()) {
                let value = if key == metadata::BODY {
                    metadata::decode_body(value)
                } else {
                    value.to_string()
                };
                logged.insert(key.to_string(), value);
            }
        }

        Self {
            is_http,
            metadata: logged,
            payload: serde_json::to_value(message).ok().filter(|v| !v.is_null()),
        }
    }
}

/// Canonical gRPC name of a status code
///
/// Same names other gRPC runtimes print, so journal records and error
/// metrics join with theirs: `OK` and `Canceled` differ from tonic's
/// `Debug` rendering.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Compose the record of a finished call
pub(crate) fn compose(
    journal_id: &JournalId,
    full_method: &str,
    request: RequestSnapshot,
    outcome: Result<Option<Value>, &Status>,
    cost_seconds: f64,
) -> JournalRecord {
    let (success, response) = match outcome {
        Ok(payload) => (
            true,
            JournalResponse {
                code: code_name(Code::Ok).to_string(),
                payload,
                ..Default::default()
            },
        ),
        Err(status) => (
            false,
            JournalResponse {
                code: code_name(status.code()).to_string(),
                message: status.message().to_string(),
                details: detail_values(status),
                payload: None,
            },
        ),
    };

    JournalRecord {
        id: journal_id.to_string(),
        request: JournalRequest {
            is_http: request.is_http,
            method: full_method.to_string(),
            metadata: request.metadata,
            payload: request.payload,
        },
        response,
        success,
        cost_seconds,
    }
}

fn detail_values(status: &Status) -> Vec<Value> {
    let Some(details) = recovery::decode_details(status) else {
        return Vec::new();
    };
    details
        .details
        .iter()
        .map(|any| match recovery::stack_trace_of(any) {
            Some(info) => json!({ "@type": any.type_url, "info": info }),
            None => json!({ "@type": any.type_url }),
        })
        .collect()
}

/// Receives finished journal records
pub trait JournalSink: Send + Sync {
    /// Emit one record; `record.success` selects the level
    fn emit(&self, record: &JournalRecord);
}

/// Logs journal records through `tracing`: info on success, error on failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJournalSink;

impl JournalSink for TracingJournalSink {
    fn emit(&self, record: &JournalRecord) {
        let journal = record.to_json();
        if record.success {
            tracing::info!(journal_id = %record.id, %journal, "unary interceptor");
        } else {
            tracing::error!(journal_id = %record.id, %journal, "unary interceptor");
        }
    }
}
