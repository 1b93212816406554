// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Gateway configuration
//!
//! ```toml
//! [gateway]
//! max_body_bytes = 4194304
//! ```

use callward_interceptor::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default request body limit (4 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// HTTP edge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Largest request body the annotator buffers
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GatewaySection {
    #[serde(default)]
    gateway: GatewayConfig,
}

impl GatewayConfig {
    /// Parse the `[gateway]` table of a TOML document
    ///
    /// Other tables are ignored so the gateway can share the interceptor's
    /// config file.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let section: GatewaySection = toml::from_str(content)?;
        section.gateway.validate()?;
        Ok(section.gateway)
    }

    /// Load the `[gateway]` table from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "gateway.max_body_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = GatewayConfig::from_toml_str("[metrics]\nnamespace = \"shop\"\n").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_custom_limit() {
        let config = GatewayConfig::from_toml_str("[gateway]\nmax_body_bytes = 1024\n").unwrap();
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = GatewayConfig::from_toml_str("[gateway]\nmax_body_bytes = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
