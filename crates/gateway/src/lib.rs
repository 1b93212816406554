// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of Callward.
//
// Callward is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Callward is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Callward. If not, see <https://www.gnu.org/licenses/>.

//! # Callward Gateway
//!
//! ## Purpose
//! HTTP edge of an HTTP-to-RPC transcoding gateway. Captures the original
//! HTTP request (credentials, date, request line, raw body, proxy headers)
//! as call metadata so validators behind the gateway can verify request
//! signatures computed over the HTTP request.
//!
//! ## Flow
//! ```text
//! HTTP request
//!   -> AnnotatorLayer      (buffer body, GatewayMetadata extension)
//!   -> transcoding handler (JSON -> message)
//!   -> relay_request       (metadata + gateway marker)
//!   -> ServerInterceptor   (Payload::Http for validators)
//! ```
//!
//! ## Example
//! ```rust,ignore
//! use callward_gateway::{relay_request, AnnotatorLayer, GatewayConfig, GatewayMetadata};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(AnnotatorLayer::new(GatewayConfig::default()))
//!     .service_fn(|request: http::Request<Full<Bytes>>| async move {
//!         let annotated = request.extensions().get::<GatewayMetadata>().cloned().unwrap_or_default();
//!         let message = transcode(request).await?;
//!         let reply = client.signup(relay_request(&annotated, message)).await;
//!         render(reply)
//!     });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod annotator;
pub mod config;
pub mod relay;

pub use annotator::{annotate, AnnotateError, AnnotatorLayer, AnnotatorService, GatewayMetadata};
pub use config::{GatewayConfig, DEFAULT_MAX_BODY_BYTES};
pub use relay::{relay_request, GatewayRelayInterceptor};
