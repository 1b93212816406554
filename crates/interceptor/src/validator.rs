// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Validator Registry - Named Auth Handlers
//!
//! ## Purpose
//! Holds the pluggable authorization and proxy-authorization validators that
//! method policies refer to by name.
//!
//! ## Lifecycle
//! 1. Collaborators register validators at startup
//! 2. [`DescriptorRegistry`](crate::descriptor::DescriptorRegistry) parses
//!    schemas and checks every declared name exists here
//! 3. The server interceptor resolves validators by name on every call
//!
//! Registration must happen before any schema that references the name is
//! parsed; forward references are rejected at parse time. Re-registering a
//! name replaces the previous validator. There is no removal API.
//!
//! ## Validator Shapes
//! - [`AuthorizationValidator`]: `authorization` credential -> caller identity
//! - [`ProxyAuthorizationValidator`]: `proxy-authorization` credential ->
//!   accept/reject (signature checks)

use crate::payload::Payload;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Opaque caller identity produced by an authorization validator
pub type Identity = Arc<dyn Any + Send + Sync>;

/// Error returned by a validator; its message is surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Create a validation error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message handed back to the caller
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Validates the `authorization` credential and yields the caller identity
#[async_trait]
pub trait AuthorizationValidator: Send + Sync {
    /// Validate `authorization` for the call described by `payload`
    async fn validate(&self, authorization: &str, payload: &Payload)
        -> Result<Identity, ValidationError>;
}

/// Validates the `proxy-authorization` credential (request signature)
#[async_trait]
pub trait ProxyAuthorizationValidator: Send + Sync {
    /// Returns `Ok(false)` to reject without a specific reason
    async fn verify(&self, proxy_authorization: &str, payload: &Payload)
        -> Result<bool, ValidationError>;
}

#[async_trait]
impl<F> AuthorizationValidator for F
where
    F: Fn(&str, &Payload) -> Result<Identity, ValidationError> + Send + Sync,
{
    async fn validate(
        &self,
        authorization: &str,
        payload: &Payload,
    ) -> Result<Identity, ValidationError> {
        self(authorization, payload)
    }
}

#[async_trait]
impl<F> ProxyAuthorizationValidator for F
where
    F: Fn(&str, &Payload) -> Result<bool, ValidationError> + Send + Sync,
{
    async fn verify(
        &self,
        proxy_authorization: &str,
        payload: &Payload,
    ) -> Result<bool, ValidationError> {
        self(proxy_authorization, payload)
    }
}

/// Identity attached to the request extensions after a successful
/// authorization check
#[derive(Clone)]
pub struct SessionIdentity(Identity);

impl SessionIdentity {
    pub(crate) fn new(identity: Identity) -> Self {
        Self(identity)
    }

    /// Borrow the identity as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// The shared identity value
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity").finish_non_exhaustive()
    }
}

/// Identity of the authenticated caller, if the method declared an
/// authorization validator
pub fn session_identity<M, T: Any>(request: &tonic::Request<M>) -> Option<&T> {
    request
        .extensions()
        .get::<SessionIdentity>()
        .and_then(|session| session.downcast_ref::<T>())
}

/// Registry of named validators
///
/// ## Concurrency
/// Reader/writer locked: writes are expected only during startup, reads
/// happen on every call that declares a validator.
#[derive(Default)]
pub struct ValidatorRegistry {
    auth: RwLock<HashMap<String, Arc<dyn AuthorizationValidator>>>,
    proxy_auth: RwLock<HashMap<String, Arc<dyn ProxyAuthorizationValidator>>>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an authorization validator
    pub fn register_auth<V>(&self, name: impl Into<String>, validator: V)
    where
        V: AuthorizationValidator + 'static,
    {
        let name = name.into();
        tracing::debug!(validator = %name, "registered authorization validator");
        self.auth.write().insert(name, Arc::new(validator));
    }

    /// Register (or replace) a proxy-authorization validator
    pub fn register_proxy_auth<V>(&self, name: impl Into<String>, validator: V)
    where
        V: ProxyAuthorizationValidator + 'static,
    {
        let name = name.into();
        tracing::debug!(validator = %name, "registered proxy-authorization validator");
        self.proxy_auth.write().insert(name, Arc::new(validator));
    }

    /// Look up an authorization validator
    pub fn resolve_auth(&self, name: &str) -> Option<Arc<dyn AuthorizationValidator>> {
        self.auth.read().get(name).cloned()
    }

    /// Look up a proxy-authorization validator
    pub fn resolve_proxy_auth(&self, name: &str) -> Option<Arc<dyn ProxyAuthorizationValidator>> {
        self.proxy_auth.read().get(name).cloned()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut auth: Vec<String> = self.auth.read().keys().cloned().collect();
        let mut proxy_auth: Vec<String> = self.proxy_auth.read().keys().cloned().collect();
        auth.sort();
        proxy_auth.sort();
        f.debug_struct("ValidatorRegistry")
            .field("auth", &auth)
            .field("proxy_auth", &proxy_auth)
            .finish()
    }
}
