// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Payload - Transport-Agnostic Call View
//!
//! ## Purpose
//! Gives validators one read-only view of an in-flight call, whether it
//! arrived through the HTTP transcoding gateway or as a native gRPC call, so a
//! signature validator can be written once and reused on both transports.
//!
//! ## Variants
//! - **Http**: `date`, `method`, `uri`, `body` are the original HTTP request
//!   values stamped into metadata by the annotator.
//! - **Rpc**: `method` is the RPC method name, `uri` the full method path and
//!   `body` the canonical JSON rendering of the request message.

use crate::metadata::{self, JournalId};
use tonic::metadata::MetadataMap;

/// Fields shared by both payload variants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFields {
    /// Journal id issued for this call
    pub journal_id: String,
    /// Fully-qualified service (`pkg.Service`)
    pub service: String,
    /// `date` metadata (empty when absent)
    pub date: String,
    /// HTTP verb for gateway calls, RPC method name otherwise
    pub method: String,
    /// Request URI for gateway calls, full method path otherwise
    pub uri: String,
    /// Raw HTTP body for gateway calls, JSON request message otherwise
    pub body: String,
}

/// Read-only view of one in-flight call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Call relayed by the HTTP transcoding gateway
    Http(CallFields),
    /// Call that arrived as native gRPC
    Rpc(CallFields),
}

impl Payload {
    /// Build the payload variant matching the call's transport
    ///
    /// ## Arguments
    /// * `journal_id` - Journal id issued for this call
    /// * `full_method` - `/pkg.Service/Method`
    /// * `metadata` - Incoming request metadata
    /// * `request_json` - JSON rendering of the request message, `None` when
    ///   the request is absent
    pub fn from_call(
        journal_id: &JournalId,
        full_method: &str,
        metadata: &MetadataMap,
        request_json: Option<String>,
    ) -> Self {
        let (service, method) = metadata::split_full_method(full_method);

        if metadata::forwarded_by_gateway(metadata) {
            Payload::Http(CallFields {
                journal_id: journal_id.to_string(),
                service: service.to_string(),
                date: metadata::first_value(metadata, metadata::DATE),
                method: metadata::first_value(metadata, metadata::METHOD),
                uri: metadata::first_value(metadata, metadata::URI),
                body: metadata::decode_body(&metadata::first_value(metadata, metadata::BODY)),
            })
        } else {
            Payload::Rpc(CallFields {
                journal_id: journal_id.to_string(),
                service: service.to_string(),
                date: metadata::first_value(metadata, metadata::DATE),
                method: method.to_string(),
                uri: full_method.to_string(),
                body: request_json.unwrap_or_default(),
            })
        }
    }

    fn fields(&self) -> &CallFields {
        match self {
            Payload::Http(fields) | Payload::Rpc(fields) => fields,
        }
    }

    /// Journal id of the call
    pub fn journal_id(&self) -> &str {
        &self.fields().journal_id
    }

    /// Whether the call was relayed by the HTTP gateway
    pub fn forwarded_by_gateway(&self) -> bool {
        matches!(self, Payload::Http(_))
    }

    /// Fully-qualified service name
    pub fn service(&self) -> &str {
        &self.fields().service
    }

    /// `Date` the caller signed with
    pub fn date(&self) -> &str {
        &self.fields().date
    }

    /// HTTP verb or RPC method name
    pub fn method(&self) -> &str {
        &self.fields().method
    }

    /// Request URI or full method path
    pub fn uri(&self) -> &str {
        &self.fields().uri
    }

    /// Raw request body
    pub fn body(&self) -> &str {
        &self.fields().body
    }
}
