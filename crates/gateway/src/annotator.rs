// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Annotator - HTTP Request to Call Metadata
//!
//! ## Purpose
//! Runs at the HTTP edge before a request is transcoded into an RPC call.
//! Copies the values a signature validator needs (credentials, date, request
//! line, raw body, proxy headers) into call metadata and stamps the gateway
//! marker so the server interceptor builds a [`Payload::Http`].
//!
//! ## Body Handling
//! The body is buffered (bounded by [`GatewayConfig::max_body_bytes`]) so it
//! can be both recorded and forwarded. The rebuilt request carries the same
//! bytes in a fresh [`Full`] body. The raw body is stored form-urlencoded so
//! any byte sequence is a valid metadata value.
//!
//! [`Payload::Http`]: callward_interceptor::Payload::Http

use crate::config::GatewayConfig;
use bytes::Bytes;
use callward_interceptor::metadata;
use http::header::{self, HeaderMap, HeaderName};
use http::StatusCode;
use http_body::Body;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tower::{Layer, Service};

/// Reasons a request cannot be annotated
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// Body exceeds the configured limit
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit
        limit: usize,
    },

    /// Body could not be read
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl AnnotateError {
    /// HTTP status answered for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnnotateError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnnotateError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Call metadata produced by [`annotate`], stored as a request extension by
/// [`AnnotatorService`]
#[derive(Debug, Clone, Default)]
pub struct GatewayMetadata(pub MetadataMap);

impl GatewayMetadata {
    /// Borrow the annotated metadata
    pub fn metadata(&self) -> &MetadataMap {
        &self.0
    }

    /// Take the annotated metadata
    pub fn into_inner(self) -> MetadataMap {
        self.0
    }
}

/// Buffer the body and derive call metadata from an HTTP request
///
/// ## Arguments
/// * `request` - Inbound HTTP request
/// * `config` - Body limit
///
/// ## Returns
/// The request with an identical, still-readable body, and the metadata to
/// forward with the transcoded call.
///
/// ## Errors
/// [`AnnotateError::BodyTooLarge`] over the limit, [`AnnotateError::Body`]
/// when the body stream fails.
pub async fn annotate<B>(
    request: http::Request<B>,
    config: &GatewayConfig,
) -> Result<(http::Request<Full<Bytes>>, MetadataMap), AnnotateError>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (parts, body) = request.into_parts();

    let body = Limited::new(body, config.max_body_bytes)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                AnnotateError::BodyTooLarge {
                    limit: config.max_body_bytes,
                }
            } else {
                AnnotateError::Body(err.to_string())
            }
        })?
        .to_bytes();

    let mut call_metadata = MetadataMap::new();
    copy_header(&mut call_metadata, &parts.headers, header::AUTHORIZATION, metadata::AUTHORIZATION);
    copy_header(
        &mut call_metadata,
        &parts.headers,
        header::PROXY_AUTHORIZATION,
        metadata::PROXY_AUTHORIZATION,
    );
    copy_header(&mut call_metadata, &parts.headers, header::DATE, metadata::DATE);
    insert_value(&mut call_metadata, metadata::METHOD, parts.method.as_str());
    insert_value(&mut call_metadata, metadata::URI, &parts.uri.to_string());
    insert_value(&mut call_metadata, metadata::BODY, &metadata::encode_body(&body));
    copy_header(
        &mut call_metadata,
        &parts.headers,
        HeaderName::from_static(metadata::X_FORWARDED_FOR),
        metadata::X_FORWARDED_FOR,
    );
    copy_header(
        &mut call_metadata,
        &parts.headers,
        HeaderName::from_static(metadata::X_FORWARDED_HOST),
        metadata::X_FORWARDED_HOST,
    );
    metadata::stamp_gateway_marker(&mut call_metadata);

    Ok((http::Request::from_parts(parts, Full::new(body)), call_metadata))
}

fn copy_header(
    call_metadata: &mut MetadataMap,
    headers: &HeaderMap,
    name: HeaderName,
    key: &'static str,
) {
    let value = headers
        .get(&name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    insert_value(call_metadata, key, value);
}

fn insert_value(call_metadata: &mut MetadataMap, key: &'static str, value: &str) {
    match value.parse::<AsciiMetadataValue>() {
        Ok(value) => {
            call_metadata.insert(key, value);
        }
        Err(_) => {
            tracing::debug!(key, "header value is not valid metadata, forwarding empty");
            call_metadata.insert(key, AsciiMetadataValue::from_static(""));
        }
    }
}

/// Tower layer running [`annotate`] in front of the transcoding handler
#[derive(Debug, Clone, Default)]
pub struct AnnotatorLayer {
    config: Arc<GatewayConfig>,
}

impl AnnotatorLayer {
    /// Create a layer with the given limits
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for AnnotatorLayer {
    type Service = AnnotatorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AnnotatorService {
            config: self.config.clone(),
            inner,
        }
    }
}

/// Service produced by [`AnnotatorLayer`]
///
/// Forwards the buffered request with a [`GatewayMetadata`] extension.
/// Over-limit bodies are answered `413`, unreadable ones `400`, without
/// reaching the inner service.
#[derive(Debug, Clone)]
pub struct AnnotatorService<S> {
    config: Arc<GatewayConfig>,
    inner: S,
}

impl<S, B> Service<http::Request<B>> for AnnotatorService<S>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<Full<Bytes>>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            match annotate(request, &config).await {
                Ok((mut request, call_metadata)) => {
                    request
                        .extensions_mut()
                        .insert(GatewayMetadata(call_metadata));
                    inner.call(request).await
                }
                Err(err) => {
                    tracing::warn!(error = %err, "rejecting gateway request");
                    Ok(error_response(&err))
                }
            }
        })
    }
}

fn error_response(err: &AnnotateError) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from(err.to_string())));
    *response.status_mut() = err.status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
