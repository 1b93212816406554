// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Observability helpers
//!
//! ## Purpose
//! - Install a `tracing` subscriber for the journal sink to write through
//! - Encode a Prometheus registry in text format for whatever `/metrics`
//!   endpoint the server mounts

use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Observability errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Metrics export failed
    #[error("Metrics export failed: {0}")]
    MetricsExportFailed(String),

    /// Subscriber could not be installed
    #[error("Tracing setup failed: {0}")]
    TracingSetupFailed(String),
}

/// Initialize structured logging
///
/// ## Configuration
/// - `RUST_LOG`: Log level filter (default `info`)
pub fn init_tracing() -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| ObservabilityError::TracingSetupFailed(e.to_string()))?;

    tracing::info!("Tracing initialized");
    Ok(())
}

/// Export a registry in Prometheus text format
pub fn export_metrics(registry: &Registry) -> Result<String, ObservabilityError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        ObservabilityError::MetricsExportFailed(format!("Failed to encode metrics: {}", e))
    })?;
    String::from_utf8(buffer).map_err(|e| {
        ObservabilityError::MetricsExportFailed(format!("Failed to convert metrics: {}", e))
    })
}
