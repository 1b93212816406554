// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Descriptor Registry - Per-Method Call Policy
//!
//! ## Purpose
//! Extracts the call policy each method declares in its service schema
//! (validators, journaling, metrics alias, HTTP rule) and serves it to the
//! server interceptor by fully-qualified method name.
//!
//! ## Schema Descriptions
//! Schemas are plain serde types so they can come from generated code or be
//! declared in TOML next to the service:
//!
//! ```toml
//! [[services]]
//! name = "demo.v1.Greeter"
//!
//! [[services.methods]]
//! name = "SayHello"
//! [services.methods.options]
//! authorization = "userinfo_handler"
//! proxy_authorization = "signature_handler"
//! journal = true
//! metrics_alias = "hello"
//! http = { post = "/v1/hello" }
//! ```
//!
//! ## Referential Integrity
//! `parse` fails when a declared validator is not registered in the
//! [`ValidatorRegistry`]. The whole service is checked before anything is
//! inserted, so a failed parse leaves the registry untouched.

use crate::error::{InterceptorError, ValidatorKind};
use crate::validator::ValidatorRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// HTTP transcoding rule declared on a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpRule {
    /// `GET <path>`
    Get(String),
    /// `PUT <path>`
    Put(String),
    /// `POST <path>`
    Post(String),
    /// `DELETE <path>`
    Delete(String),
    /// `PATCH <path>`
    Patch(String),
}

impl HttpRule {
    /// Lowercase HTTP verb
    pub fn verb(&self) -> &'static str {
        match self {
            HttpRule::Get(_) => "get",
            HttpRule::Put(_) => "put",
            HttpRule::Post(_) => "post",
            HttpRule::Delete(_) => "delete",
            HttpRule::Patch(_) => "patch",
        }
    }

    /// Path template
    pub fn path(&self) -> &str {
        match self {
            HttpRule::Get(path)
            | HttpRule::Put(path)
            | HttpRule::Post(path)
            | HttpRule::Delete(path)
            | HttpRule::Patch(path) => path,
        }
    }
}

impl fmt::Display for HttpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path())
    }
}

/// Policy options declared on one method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodOptions {
    /// Name of the authorization validator
    pub authorization: Option<String>,
    /// Name of the proxy-authorization validator
    pub proxy_authorization: Option<String>,
    /// Emit a journal record for every call
    pub journal: bool,
    /// Logical name used for metrics
    pub metrics_alias: Option<String>,
    /// HTTP transcoding rule
    pub http: Option<HttpRule>,
}

/// One method of a service schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name (`SayHello`)
    pub name: String,
    /// Declared policy
    #[serde(default)]
    pub options: MethodOptions,
}

/// One service of a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Fully-qualified service name (`demo.v1.Greeter`)
    pub name: String,
    /// Methods of the service
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Create an empty service description
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method with its options
    pub fn method(mut self, name: impl Into<String>, options: MethodOptions) -> Self {
        self.methods.push(MethodDescriptor {
            name: name.into(),
            options,
        });
        self
    }
}

/// A schema file holding several services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Services declared in the file
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl FileDescriptor {
    /// Parse a schema description from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Call policy of one fully-qualified method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodPolicy {
    /// Authorization validator name
    pub auth_validator: Option<String>,
    /// Proxy-authorization validator name
    pub proxy_auth_validator: Option<String>,
    /// Journal every call
    pub journal: bool,
    /// Metrics alias
    pub metrics_alias: Option<String>,
    /// HTTP transcoding rule
    pub http: Option<HttpRule>,
}

impl MethodPolicy {
    /// Whether the method declares any validator
    pub fn requires_validation(&self) -> bool {
        self.auth_validator.is_some() || self.proxy_auth_validator.is_some()
    }

    /// Logical method name for metrics
    ///
    /// ## Priority
    /// 1. Metrics alias
    /// 2. `"<verb> <path>"` from the HTTP rule
    /// 3. The full method itself
    pub fn metric_name(&self, full_method: &str) -> String {
        if let Some(alias) = self.metrics_alias.as_deref().filter(|alias| !alias.is_empty()) {
            return alias.to_string();
        }
        match &self.http {
            Some(rule) => rule.to_string(),
            None => full_method.to_string(),
        }
    }
}

impl From<&MethodOptions> for MethodPolicy {
    fn from(options: &MethodOptions) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Self {
            auth_validator: non_empty(&options.authorization),
            proxy_auth_validator: non_empty(&options.proxy_authorization),
            journal: options.journal,
            metrics_alias: non_empty(&options.metrics_alias),
            http: options.http.clone(),
        }
    }
}

/// Registry of method policies keyed by `/pkg.Service/Method`
pub struct DescriptorRegistry {
    validators: Arc<ValidatorRegistry>,
    policies: RwLock<HashMap<String, Arc<MethodPolicy>>>,
    open: Arc<MethodPolicy>,
}

impl DescriptorRegistry {
    /// Create an empty registry checking names against `validators`
    pub fn new(validators: Arc<ValidatorRegistry>) -> Self {
        Self {
            validators,
            policies: RwLock::new(HashMap::new()),
            open: Arc::new(MethodPolicy::default()),
        }
    }

    /// Validators this registry checks against
    pub fn validators(&self) -> &Arc<ValidatorRegistry> {
        &self.validators
    }

    /// Extract and register the policy of every method of `service`
    ///
    /// ## Errors
    /// [`InterceptorError::UnknownValidator`] when a method names a validator
    /// that is not registered. Nothing is inserted in that case.
    pub fn parse(&self, service: &ServiceDescriptor) -> Result<(), InterceptorError> {
        let parsed = self.resolve(service)?;
        self.insert(parsed);
        Ok(())
    }

    /// Parse every service of a schema file
    ///
    /// All services are checked before any is registered: one bad method
    /// leaves the registry untouched.
    pub fn parse_file(&self, file: &FileDescriptor) -> Result<(), InterceptorError> {
        let mut parsed = Vec::new();
        for service in &file.services {
            parsed.extend(self.resolve(service)?);
        }
        self.insert(parsed);
        Ok(())
    }

    fn resolve(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<Vec<(String, Arc<MethodPolicy>)>, InterceptorError> {
        let mut parsed = Vec::with_capacity(service.methods.len());

        for method in &service.methods {
            let full_method = format!("/{}/{}", service.name, method.name);
            let policy = MethodPolicy::from(&method.options);

            if let Some(name) = &policy.auth_validator {
                if self.validators.resolve_auth(name).is_none() {
                    return Err(InterceptorError::UnknownValidator {
                        method: full_method,
                        kind: ValidatorKind::Authorization,
                        name: name.clone(),
                    });
                }
            }
            if let Some(name) = &policy.proxy_auth_validator {
                if self.validators.resolve_proxy_auth(name).is_none() {
                    return Err(InterceptorError::UnknownValidator {
                        method: full_method,
                        kind: ValidatorKind::ProxyAuthorization,
                        name: name.clone(),
                    });
                }
            }

            parsed.push((full_method, Arc::new(policy)));
        }
        Ok(parsed)
    }

    fn insert(&self, parsed: Vec<(String, Arc<MethodPolicy>)>) {
        let mut policies = self.policies.write();
        for (full_method, policy) in parsed {
            tracing::debug!(method = %full_method, ?policy, "registered method policy");
            policies.insert(full_method, policy);
        }
    }

    /// Policy of `full_method`; unknown methods get the open policy
    /// (no validators, no journal, no alias)
    pub fn lookup(&self, full_method: &str) -> Arc<MethodPolicy> {
        self.policies
            .read()
            .get(full_method)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.open))
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    /// Whether no method is registered
    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.policies.read().keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
