// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Interceptor Errors
//!
//! ## Purpose
//! Startup-time failures of the interceptor stack. None of these ever surface
//! on a live call: per-call failures are `tonic::Status` values built by the
//! server interceptor.
//!
//! ## Taxonomy
//! - **UnknownValidator**: a method's policy names a validator that was not
//!   registered before the schema was parsed. Callers are expected to abort
//!   initialization on this error.
//! - **Metrics**: prometheus collector registration failed.
//! - **Config**: configuration could not be loaded or parsed.

use crate::config::ConfigError;
use thiserror::Error;
use tonic::Status;

/// Kind of validator a method policy refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    /// `authorization` validator (bearer credential -> identity)
    Authorization,
    /// `proxy-authorization` validator (signature credential -> accept/reject)
    ProxyAuthorization,
}

impl std::fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorKind::Authorization => write!(f, "authorization"),
            ValidatorKind::ProxyAuthorization => write!(f, "proxy_authorization"),
        }
    }
}

/// Errors raised while building the interceptor stack
#[derive(Debug, Error)]
pub enum InterceptorError {
    /// Method policy references a validator that is not registered
    #[error("{method} options.{kind} validator: [{name}] not found")]
    UnknownValidator {
        /// Fully-qualified method (`/pkg.Service/Method`)
        method: String,
        /// Which validator registry was consulted
        kind: ValidatorKind,
        /// Declared validator name
        name: String,
    },

    /// Prometheus collector could not be created or registered
    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<InterceptorError> for Status {
    fn from(err: InterceptorError) -> Status {
        match err {
            InterceptorError::UnknownValidator { .. } => Status::failed_precondition(err.to_string()),
            InterceptorError::Metrics(_) | InterceptorError::Config(_) => {
                Status::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_validator_message() {
        let err = InterceptorError::UnknownValidator {
            method: "/demo.Greeter/Hello".to_string(),
            kind: ValidatorKind::ProxyAuthorization,
            name: "sig".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "/demo.Greeter/Hello options.proxy_authorization validator: [sig] not found"
        );
        let status: Status = err.into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }
}
