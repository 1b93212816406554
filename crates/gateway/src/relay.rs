// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Relay of transcoded calls to the RPC server
//!
//! The gateway's client channel stamps the gateway marker on every outgoing
//! call so the server interceptor treats it as HTTP-originated.

use crate::annotator::GatewayMetadata;
use callward_interceptor::metadata;
use tonic::service::Interceptor;
use tonic::{Extensions, Request, Status};

/// Client-side interceptor for the gateway's outgoing channel
///
/// ```rust,ignore
/// let client = UsersClient::with_interceptor(channel, GatewayRelayInterceptor);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayRelayInterceptor;

impl Interceptor for GatewayRelayInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        metadata::stamp_gateway_marker(request.metadata_mut());
        Ok(request)
    }
}

/// Build the outgoing request of a transcoded call
///
/// Carries the annotated metadata and the gateway marker.
pub fn relay_request<T>(annotated: &GatewayMetadata, message: T) -> Request<T> {
    let mut request = Request::from_parts(annotated.metadata().clone(), Extensions::default(), message);
    metadata::stamp_gateway_marker(request.metadata_mut());
    request
}
