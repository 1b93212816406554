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

//! # Callward Interceptor
//!
//! ## Purpose
//! Server-side interception layer for tonic services. Every unary call is
//! authenticated, authorized, journaled, recovered from panics and measured
//! according to the policy its method declares in the service schema.
//!
//! ## Architecture Context
//! - **Schema**: [`ServiceDescriptor`]s (code or TOML) name per-method
//!   validators, journaling, metric alias and HTTP binding
//! - **Registries**: [`ValidatorRegistry`] holds named validators;
//!   [`DescriptorRegistry`] resolves each method's [`MethodPolicy`] once at
//!   startup and rejects unknown validator names
//! - **Pipeline**: [`ServerInterceptor::unary`] wraps each handler
//! - **Edge**: the `callward-gateway` crate marks HTTP-transcoded calls so
//!   validators see a [`Payload::Http`]
//!
//! ## Design Principles
//! 1. **Declarative**: Policy lives in the schema, not in handlers
//! 2. **Fail Fast**: Misconfigured schemas abort startup
//! 3. **Contained**: A panicking handler or validator becomes `Internal`
//! 4. **Observable**: Every call yields latency or error metrics
//!
//! ## Example
//! ```rust,ignore
//! use callward_interceptor::{
//!     DescriptorRegistry, MethodOptions, ServerInterceptor, ServiceDescriptor,
//!     ValidationError, ValidatorRegistry, PrometheusMetrics,
//! };
//! use std::sync::Arc;
//!
//! let validators = Arc::new(ValidatorRegistry::new());
//! validators.register_auth("bearer", |credential: &str, _payload: &callward_interceptor::Payload| {
//!     if credential.starts_with("Bearer ") {
//!         Ok(Arc::new(credential[7..].to_string()) as callward_interceptor::Identity)
//!     } else {
//!         Err(ValidationError::new("missing bearer token"))
//!     }
//! });
//!
//! let descriptors = Arc::new(DescriptorRegistry::new(validators));
//! descriptors.parse(
//!     &ServiceDescriptor::new("shop.v1.Orders").method(
//!         "Create",
//!         MethodOptions {
//!             authorization: Some("bearer".into()),
//!             journal: true,
//!             ..Default::default()
//!         },
//!     ),
//! )?;
//!
//! let interceptor = ServerInterceptor::new(descriptors, Arc::new(PrometheusMetrics::global().clone()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod journal;
pub mod memory;
pub mod metadata;
pub mod metrics;
pub mod observability;
pub mod payload;
pub mod recovery;
pub mod server;
pub mod validator;

pub use config::{ConfigError, InterceptorConfig, MetricsConfig};
pub use descriptor::{
    DescriptorRegistry, FileDescriptor, HttpRule, MethodDescriptor, MethodOptions, MethodPolicy,
    ServiceDescriptor,
};
pub use error::{InterceptorError, ValidatorKind};
pub use journal::{code_name, JournalRecord, JournalRequest, JournalResponse, JournalSink, TracingJournalSink};
pub use memory::{ErrorObservation, MemoryJournalSink, MemoryMetrics};
pub use metadata::JournalId;
pub use metrics::{MetricsSink, PrometheusMetrics, CALL_METRICS_REGISTRY};
pub use observability::{export_metrics, init_tracing, ObservabilityError};
pub use payload::{CallFields, Payload};
pub use recovery::stack_trace;
pub use server::ServerInterceptor;
pub use validator::{
    session_identity, AuthorizationValidator, Identity, ProxyAuthorizationValidator,
    SessionIdentity, ValidationError, ValidatorRegistry,
};

/// Result type for interceptor setup operations
pub type Result<T> = std::result::Result<T, InterceptorError>;
