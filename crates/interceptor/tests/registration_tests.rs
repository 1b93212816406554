// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! Registration order, schema files, config-driven setup and metric naming.

use callward_interceptor::{
    export_metrics, DescriptorRegistry, FileDescriptor, InterceptorConfig, InterceptorError,
    Payload, ServerInterceptor, ServiceDescriptor, ValidationError, ValidatorKind,
    ValidatorRegistry,
};
use prometheus::Registry;
use std::sync::Arc;
use tonic::{Request, Response, Status};

const SCHEMA: &str = r#"
[[services]]
name = "demo.v1.Users"

[[services.methods]]
name = "Signup"
options = { proxy_authorization = "v1", journal = true, metrics_alias = "signup" }

[[services.methods]]
name = "Lookup"
options = { http = { get = "/v1/users/{id}" } }

[[services.methods]]
name = "Ping"
"#;

fn accept_all(_signature: &str, _payload: &Payload) -> Result<bool, ValidationError> {
    Ok(true)
}

#[test]
fn test_parse_after_registering_v1() {
    let validators = Arc::new(ValidatorRegistry::new());
    validators.register_proxy_auth("v1", accept_all);

    let descriptors = DescriptorRegistry::new(validators);
    descriptors
        .parse_file(&FileDescriptor::from_toml_str(SCHEMA).unwrap())
        .unwrap();

    assert_eq!(descriptors.len(), 3);
    let policy = descriptors.lookup("/demo.v1.Users/Signup");
    assert_eq!(policy.proxy_auth_validator.as_deref(), Some("v1"));
    assert!(policy.journal);
}

#[test]
fn test_parse_without_registering_v1_fails() {
    let descriptors = DescriptorRegistry::new(Arc::new(ValidatorRegistry::new()));

    let err = descriptors
        .parse_file(&FileDescriptor::from_toml_str(SCHEMA).unwrap())
        .unwrap_err();

    match &err {
        InterceptorError::UnknownValidator { method, kind, name } => {
            assert_eq!(method, "/demo.v1.Users/Signup");
            assert_eq!(*kind, ValidatorKind::ProxyAuthorization);
            assert_eq!(name, "v1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "/demo.v1.Users/Signup options.proxy_authorization validator: [v1] not found"
    );
    assert!(descriptors.is_empty());
}

#[test]
fn test_unknown_service_gets_open_policy() {
    let descriptors = DescriptorRegistry::new(Arc::new(ValidatorRegistry::new()));
    descriptors
        .parse(&ServiceDescriptor::new("demo.v1.Empty"))
        .unwrap();

    let policy = descriptors.lookup("/demo.v1.Nowhere/Call");
    assert!(!policy.requires_validation());
    assert!(!policy.journal);
    assert_eq!(policy.metric_name("/demo.v1.Nowhere/Call"), "/demo.v1.Nowhere/Call");
}

#[tokio::test]
async fn test_from_config_exports_metric_names_by_priority() {
    let config = InterceptorConfig::from_toml_str(SCHEMA).unwrap();
    let validators = Arc::new(ValidatorRegistry::new());
    validators.register_proxy_auth("v1", accept_all);
    let registry = Registry::new();

    let interceptor = ServerInterceptor::from_config(&config, validators, &registry).unwrap();

    for method in [
        "/demo.v1.Users/Signup",
        "/demo.v1.Users/Lookup",
        "/demo.v1.Users/Ping",
    ] {
        interceptor
            .unary(method, Request::new(()), |_request: Request<()>| async {
                Ok(Response::new(()))
            })
            .await
            .unwrap();
    }
    let _ = interceptor
        .unary("/demo.v1.Users/Ping", Request::new(()), |_request: Request<()>| async {
            Err::<Response<()>, _>(Status::unavailable("down"))
        })
        .await;

    let text = export_metrics(&registry).unwrap();
    assert!(text.contains(r#"callward_interceptor_requestcost_count{method="signup"} 1"#));
    assert!(text.contains(r#"method="get /v1/users/{id}""#));
    assert!(text.contains(r#"callward_interceptor_requestcost_count{method="/demo.v1.Users/Ping"} 1"#));
    assert!(text.contains("callward_interceptor_errors_total"));
    assert!(text.contains(r#"code="Unavailable""#));
}

#[test]
fn test_from_config_rejects_unknown_validator() {
    let config = InterceptorConfig::from_toml_str(SCHEMA).unwrap();
    let result = ServerInterceptor::from_config(
        &config,
        Arc::new(ValidatorRegistry::new()),
        &Registry::new(),
    );
    assert!(matches!(result, Err(InterceptorError::UnknownValidator { .. })));
}
