// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # ServerInterceptor - Policy-Driven Unary Call Pipeline
//!
//! ## Purpose
//! Wraps every unary handler of a tonic service so that authentication,
//! authorization, journaling, panic recovery and metrics are applied
//! uniformly from the policy each method declares in its schema.
//!
//! ## Call Pipeline
//! 1. Issue a journal id, insert it into request metadata and extensions
//! 2. Look up the method policy (unknown methods get the open policy)
//! 3. Inner guard: validators and handler run under `catch_unwind`
//!    a. No validator declared: dispatch straight to the handler
//!    b. Build the [`Payload`] for the call's transport
//!    c. `authorization` validator: error -> `Unauthenticated`
//!    d. `proxy-authorization` validator: error or `false` -> `PermissionDenied`
//!    e. Dispatch to the handler
//! 4. Outer guard: completion runs under `catch_unwind`
//!    - convert a panic from the inner guard into `Internal` and log it
//!    - emit the journal record (if the policy enables it)
//!    - record latency (success) or count the error (failure)
//!    - echo `journal_id` on the response or error status
//!
//!    Journal and metrics are guarded separately, so a panicking journal
//!    sink still leaves the call counted.
//!
//! Completion runs exactly once per call on every exit path. A call whose
//! future is dropped before it finishes (caller cancelled, deadline hit) is
//! completed from `Drop` with a `Cancelled` status (`Canceled` in records).
//!
//! ## Usage
//! ```rust,ignore
//! #[tonic::async_trait]
//! impl Greeter for GreeterService {
//!     async fn say_hello(&self, request: Request<HelloRequest>)
//!         -> Result<Response<HelloReply>, Status> {
//!         self.interceptor
//!             .unary("/demo.v1.Greeter/SayHello", request, |request| async move {
//!                 Ok(Response::new(HelloReply { message: request.into_inner().name }))
//!             })
//!             .await
//!     }
//! }
//! ```

use crate::config::InterceptorConfig;
use crate::descriptor::{DescriptorRegistry, MethodPolicy};
use crate::error::InterceptorError;
use crate::journal::{self, JournalSink, RequestSnapshot, TracingJournalSink};
use crate::metadata::{self, JournalId};
use crate::metrics::{MetricsSink, PrometheusMetrics};
use crate::payload::Payload;
use crate::recovery;
use crate::validator::{SessionIdentity, ValidatorRegistry};
use futures::FutureExt;
use prometheus::Registry;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

/// Message of `PermissionDenied` when a proxy validator rejects without error
pub const PERMISSION_DENIED_MESSAGE: &str = "PermissionDenied";

/// Message of the streaming rejection
pub const STREAMING_UNSUPPORTED_MESSAGE: &str = "streaming calls are not currently supported";

/// Server-side call interceptor
#[derive(Clone)]
pub struct ServerInterceptor {
    descriptors: Arc<DescriptorRegistry>,
    metrics: Arc<dyn MetricsSink>,
    journal: Arc<dyn JournalSink>,
}

impl ServerInterceptor {
    /// Create an interceptor journaling through `tracing`
    pub fn new(descriptors: Arc<DescriptorRegistry>, metrics: Arc<dyn MetricsSink>) -> Self {
        recovery::install_panic_hook();
        Self {
            descriptors,
            metrics,
            journal: Arc::new(TracingJournalSink),
        }
    }

    /// Replace the journal sink
    pub fn with_journal_sink(mut self, journal: Arc<dyn JournalSink>) -> Self {
        self.journal = journal;
        self
    }

    /// Build registries and Prometheus metrics from configuration
    ///
    /// ## Arguments
    /// * `config` - Metrics settings and declared services
    /// * `validators` - Validators referenced by the declared services; must
    ///   be fully registered before this call
    /// * `registry` - Registry receiving the call metrics
    ///
    /// ## Errors
    /// Invalid config, unknown validator names, or metric name clashes. All
    /// of them should abort startup.
    pub fn from_config(
        config: &InterceptorConfig,
        validators: Arc<ValidatorRegistry>,
        registry: &Registry,
    ) -> Result<Self, InterceptorError> {
        config.validate()?;

        let descriptors = Arc::new(DescriptorRegistry::new(validators));
        descriptors.parse_file(&config.schema())?;

        let metrics = PrometheusMetrics::new(&config.metrics, registry)?;
        tracing::info!(
            methods = descriptors.len(),
            "Server interceptor configured"
        );
        Ok(Self::new(descriptors, Arc::new(metrics)))
    }

    /// Policies consulted by this interceptor
    pub fn descriptors(&self) -> &Arc<DescriptorRegistry> {
        &self.descriptors
    }

    /// Run one unary call through the pipeline
    ///
    /// ## Arguments
    /// * `full_method` - `/pkg.Service/Method`
    /// * `request` - Incoming request
    /// * `handler` - Service logic; receives the request with `journal_id`
    ///   metadata and, when authorized, a [`SessionIdentity`] extension
    pub async fn unary<Req, Resp, H, Fut>(
        &self,
        full_method: &str,
        mut request: Request<Req>,
        handler: H,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Serialize,
        Resp: Serialize,
        H: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let started = Instant::now();
        let journal_id = JournalId::generate();
        let policy = self.descriptors.lookup(full_method);

        if let Some(value) = journal_id.to_metadata_value() {
            request.metadata_mut().insert(metadata::JOURNAL_ID, value);
        }
        request.extensions_mut().insert(journal_id.clone());

        let mut completion = Completion {
            interceptor: self,
            journal_id: &journal_id,
            full_method,
            policy: &policy,
            snapshot: None,
            started,
            done: false,
        };

        let outcome = AssertUnwindSafe(async {
            if policy.journal {
                completion.snapshot =
                    Some(RequestSnapshot::capture(request.metadata(), request.get_ref()));
            }
            self.authorize_and_dispatch(&journal_id, full_method, &policy, request, handler)
                .await
        })
        .catch_unwind()
        .await;

        completion.finish(outcome)
    }

    /// Streaming calls are not supported; always rejects with `Unimplemented`
    pub async fn stream<Resp>(&self, full_method: &str) -> Result<Response<Resp>, Status> {
        let journal_id = JournalId::generate();
        tracing::warn!(
            journal_id = %journal_id,
            method = %full_method,
            "{}",
            STREAMING_UNSUPPORTED_MESSAGE
        );
        let mut status = Status::unimplemented(STREAMING_UNSUPPORTED_MESSAGE);
        if let Some(value) = journal_id.to_metadata_value() {
            status.metadata_mut().insert(metadata::JOURNAL_ID, value);
        }
        Err(status)
    }

    async fn authorize_and_dispatch<Req, Resp, H, Fut>(
        &self,
        journal_id: &JournalId,
        full_method: &str,
        policy: &MethodPolicy,
        mut request: Request<Req>,
        handler: H,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Serialize,
        H: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let validators = self.descriptors.validators();
        let auth = policy
            .auth_validator
            .as_deref()
            .and_then(|name| validators.resolve_auth(name));
        let proxy_auth = policy
            .proxy_auth_validator
            .as_deref()
            .and_then(|name| validators.resolve_proxy_auth(name));

        if auth.is_none() && proxy_auth.is_none() {
            return handler(request).await;
        }

        let request_json = serde_json::to_value(request.get_ref())
            .ok()
            .filter(|value| !value.is_null())
            .map(|value| value.to_string());
        let payload = Payload::from_call(journal_id, full_method, request.metadata(), request_json);

        if let Some(validator) = auth {
            let credential = metadata::first_value(request.metadata(), metadata::AUTHORIZATION);
            match validator.validate(&credential, &payload).await {
                Ok(identity) => {
                    request
                        .extensions_mut()
                        .insert(SessionIdentity::new(identity));
                }
                Err(err) => {
                    tracing::debug!(
                        journal_id = %journal_id,
                        method = %full_method,
                        error = %err,
                        "authorization rejected"
                    );
                    return Err(Status::unauthenticated(err.message()));
                }
            }
        }

        if let Some(validator) = proxy_auth {
            let credential =
                metadata::first_value(request.metadata(), metadata::PROXY_AUTHORIZATION);
            match validator.verify(&credential, &payload).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        journal_id = %journal_id,
                        method = %full_method,
                        "proxy-authorization rejected"
                    );
                    return Err(Status::permission_denied(PERMISSION_DENIED_MESSAGE));
                }
                Err(err) => {
                    tracing::debug!(
                        journal_id = %journal_id,
                        method = %full_method,
                        error = %err,
                        "proxy-authorization failed"
                    );
                    return Err(Status::permission_denied(err.message()));
                }
            }
        }

        handler(request).await
    }
}

/// Result of the inner guard: the call's result, or the payload of a panic
type CallOutcome<Resp> = Result<Result<Response<Resp>, Status>, Box<dyn Any + Send>>;

/// Completion stage of one call: journal record, metrics, journal id echo
struct Completion<'a> {
    interceptor: &'a ServerInterceptor,
    journal_id: &'a JournalId,
    full_method: &'a str,
    policy: &'a MethodPolicy,
    snapshot: Option<RequestSnapshot>,
    started: Instant,
    done: bool,
}

impl Completion<'_> {
    fn finish<Resp: Serialize>(mut self, outcome: CallOutcome<Resp>) -> Result<Response<Resp>, Status> {
        self.done = true;

        let mut result = match std::panic::catch_unwind(AssertUnwindSafe(|| self.recover(outcome))) {
            Ok(result) => result,
            Err(payload) => Err(recovery::double_panic_status(self.journal_id, payload)),
        };
        self.settle(&mut result);
        result
    }

    /// Turn a panic caught by the inner guard into an `Internal` status
    fn recover<Resp>(&self, outcome: CallOutcome<Resp>) -> Result<Response<Resp>, Status> {
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let status = recovery::panic_status(self.journal_id, payload);
                tracing::error!(
                    journal_id = %self.journal_id,
                    method = %self.full_method,
                    error = %status.message(),
                    "recovered panic in call"
                );
                Err(status)
            }
        }
    }

    /// Journal, metrics, then journal id echo
    ///
    /// Journal and metrics are guarded separately: a panic in either replaces
    /// the result with a double-panic status and the remaining stages still run.
    fn settle<Resp: Serialize>(&mut self, result: &mut Result<Response<Resp>, Status>) {
        let cost_seconds = self.started.elapsed().as_secs_f64();

        if self.policy.journal {
            let journaled = std::panic::catch_unwind(AssertUnwindSafe(|| {
                self.write_journal(&*result, cost_seconds)
            }));
            if let Err(payload) = journaled {
                *result = Err(recovery::double_panic_status(self.journal_id, payload));
            }
        }

        let recorded = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.record_metrics(&*result, cost_seconds)
        }));
        if let Err(payload) = recorded {
            *result = Err(recovery::double_panic_status(self.journal_id, payload));
        }

        if let Some(value) = self.journal_id.to_metadata_value() {
            match result {
                Ok(response) => {
                    response.metadata_mut().insert(metadata::JOURNAL_ID, value);
                }
                Err(status) => {
                    status.metadata_mut().insert(metadata::JOURNAL_ID, value);
                }
            }
        }
    }

    fn write_journal<Resp: Serialize>(&mut self, result: &Result<Response<Resp>, Status>, cost_seconds: f64) {
        let outcome = match result {
            Ok(response) => Ok(serde_json::to_value(response.get_ref())
                .ok()
                .filter(|value| !Value::is_null(value))),
            Err(status) => Err(status),
        };
        let record = journal::compose(
            self.journal_id,
            self.full_method,
            self.snapshot.take().unwrap_or_default(),
            outcome,
            cost_seconds,
        );
        self.interceptor.journal.emit(&record);
    }

    fn record_metrics<Resp>(&self, result: &Result<Response<Resp>, Status>, cost_seconds: f64) {
        let method = self.policy.metric_name(self.full_method);
        match result {
            Ok(_) => self.interceptor.metrics.observe_latency(&method, cost_seconds),
            Err(status) => self.interceptor.metrics.record_error(
                &method,
                journal::code_name(status.code()),
                status.message(),
                self.journal_id.as_str(),
            ),
        }
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if self.done || std::thread::panicking() {
            return;
        }
        // Call future dropped before the handler returned
        let mut cancelled: Result<Response<()>, Status> =
            Err(Status::cancelled("call cancelled before completion"));
        self.settle(&mut cancelled);
    }
}
