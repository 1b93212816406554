// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Call Metrics - Prometheus Sink
//!
//! ## Purpose
//! Two series per logical method name:
//! - `<ns>_<sub>_requestcost` - latency histogram of successful calls
//! - `<ns>_<sub>_errors_total` - failed calls by method, status code, error
//!   text and journal id
//!
//! ## Logical Method Name
//! Chosen by [`MethodPolicy::metric_name`](crate::descriptor::MethodPolicy::metric_name):
//! metrics alias, then `"<verb> <path>"` from the HTTP rule, then the full
//! method.
//!
//! ## Design
//! - The interceptor only talks to the [`MetricsSink`] trait
//! - [`PrometheusMetrics`] registers into any registry; tests use a fresh one
//! - [`PrometheusMetrics::global`] uses the process-wide
//!   [`CALL_METRICS_REGISTRY`] for servers that expose one `/metrics` endpoint

use crate::config::MetricsConfig;
use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry for call metrics
    pub static ref CALL_METRICS_REGISTRY: Registry = Registry::new();

    static ref GLOBAL_CALL_METRICS: PrometheusMetrics =
        PrometheusMetrics::new(&MetricsConfig::default(), &CALL_METRICS_REGISTRY)
            .expect("default call metrics register into an empty registry");
}

/// Destination of per-call metric observations
pub trait MetricsSink: Send + Sync {
    /// Record the latency of a successful call
    fn observe_latency(&self, method: &str, seconds: f64);

    /// Count a failed call
    fn record_error(&self, method: &str, code: &str, error: &str, journal_id: &str);
}

/// Prometheus-backed [`MetricsSink`]
#[derive(Clone)]
pub struct PrometheusMetrics {
    request_cost: HistogramVec,
    errors: IntCounterVec,
}

impl PrometheusMetrics {
    /// Create the collectors and register them into `registry`
    ///
    /// ## Errors
    /// Fails when the registry already holds collectors with the same names.
    pub fn new(config: &MetricsConfig, registry: &Registry) -> Result<Self, prometheus::Error> {
        let request_cost = HistogramVec::new(
            HistogramOpts::new("requestcost", "request(s) cost seconds")
                .namespace(config.namespace.clone())
                .subsystem(config.subsystem.clone())
                .buckets(config.latency_buckets.clone()),
            &["method"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "failed request(s) by status and journal id")
                .namespace(config.namespace.clone())
                .subsystem(config.subsystem.clone()),
            &["method", "code", "error", "journal_id"],
        )?;

        registry.register(Box::new(request_cost.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            request_cost,
            errors,
        })
    }

    /// Metrics registered in [`CALL_METRICS_REGISTRY`] with default settings
    pub fn global() -> &'static PrometheusMetrics {
        &GLOBAL_CALL_METRICS
    }

    /// Latency histogram
    pub fn request_cost(&self) -> &HistogramVec {
        &self.request_cost
    }

    /// Error counter
    pub fn errors(&self) -> &IntCounterVec {
        &self.errors
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_latency(&self, method: &str, seconds: f64) {
        self.request_cost
            .with_label_values(&[method])
            .observe(seconds);
    }

    fn record_error(&self, method: &str, code: &str, error: &str, journal_id: &str) {
        self.errors
            .with_label_values(&[method, code, error, journal_id])
            .inc();
    }
}
