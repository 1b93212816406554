// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Interceptor configuration
//!
//! ## Precedence (Highest to Lowest)
//! 1. File named by `CALLWARD_CONFIG_PATH`
//! 2. `callward.toml` in the working directory
//! 3. `Default::default()`
//!
//! ## Example
//! ```toml
//! [metrics]
//! namespace = "callward"
//! subsystem = "interceptor"
//! latency_buckets = [0.1, 0.3, 0.5, 0.7, 0.9, 1.1]
//!
//! [[services]]
//! name = "demo.v1.Greeter"
//! [[services.methods]]
//! name = "SayHello"
//! options = { journal = true, metrics_alias = "hello" }
//! ```

use crate::descriptor::{FileDescriptor, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CALLWARD_CONFIG_PATH";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "callward.toml";

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the schema
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Values violate a configuration invariant
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Metric naming and histogram layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metric namespace
    pub namespace: String,
    /// Metric subsystem
    pub subsystem: String,
    /// Latency histogram bucket boundaries (seconds)
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "callward".to_string(),
            subsystem: "interceptor".to_string(),
            latency_buckets: vec![0.1, 0.3, 0.5, 0.7, 0.9, 1.1],
        }
    }
}

/// Top-level interceptor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Metrics settings
    pub metrics: MetricsConfig,
    /// Service schemas declaring per-method policy
    pub services: Vec<ServiceDescriptor>,
}

impl InterceptorConfig {
    /// Load with precedence: env path > `callward.toml` > defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Self::load_from_file(&path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load_from_file(DEFAULT_CONFIG_FILE);
        }
        tracing::debug!("No interceptor config found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded interceptor config");
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buckets = &self.metrics.latency_buckets;
        if buckets.is_empty() {
            return Err(ConfigError::Invalid("metrics.latency_buckets must not be empty".into()));
        }
        if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::Invalid(
                "metrics.latency_buckets must be strictly increasing".into(),
            ));
        }
        if self.services.iter().any(|service| service.name.is_empty()) {
            return Err(ConfigError::Invalid("service name must not be empty".into()));
        }
        Ok(())
    }

    /// Declared services as a schema file
    pub fn schema(&self) -> FileDescriptor {
        FileDescriptor {
            services: self.services.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HttpRule;

    #[test]
    fn test_defaults() {
        let config = InterceptorConfig::default();
        assert_eq!(config.metrics.latency_buckets, vec![0.1, 0.3, 0.5, 0.7, 0.9, 1.1]);
        assert!(config.services.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = InterceptorConfig::from_toml_str(
            r#"
            [metrics]
            namespace = "shop"

            [[services]]
            name = "shop.v1.Orders"
            [[services.methods]]
            name = "Create"
            options = { journal = true, http = { post = "/v1/orders" } }
            "#,
        )
        .unwrap();

        assert_eq!(config.metrics.namespace, "shop");
        assert_eq!(config.metrics.subsystem, "interceptor");
        let schema = config.schema();
        assert_eq!(schema.services.len(), 1);
        let options = &schema.services[0].methods[0].options;
        assert!(options.journal);
        assert_eq!(options.http, Some(HttpRule::Post("/v1/orders".into())));
    }

    #[test]
    fn test_rejects_unordered_buckets() {
        let err = InterceptorConfig::from_toml_str(
            r#"
            [metrics]
            latency_buckets = [0.5, 0.1]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = InterceptorConfig::load_from_file("/nonexistent/callward.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
