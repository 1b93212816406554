// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Interceptor Integration Tests
//!
//! ## Purpose
//! End-to-end behaviour of [`ServerInterceptor::unary`] against in-memory
//! journal and metrics sinks.
//!
//! ## Tests
//! - Signup scenario (proxy-authorization accepted and rejected)
//! - Authorization rejection and identity propagation
//! - Open methods never build a payload
//! - Panic recovery (handler, validator, failing log backend) and task survival
//! - Journal id uniqueness and metadata allow-list
//! - Cancellation and double panic completion

use async_trait::async_trait;
use callward_interceptor::metadata::{self, LOGGED_METADATA};
use callward_interceptor::{
    session_identity, stack_trace, DescriptorRegistry, HttpRule, Identity, JournalRecord,
    JournalSink, MemoryJournalSink, MemoryMetrics, MethodOptions, Payload,
    ProxyAuthorizationValidator, ServerInterceptor, ServiceDescriptor, ValidationError,
    ValidatorRegistry,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::{Code, Request, Response, Status};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const SIGNUP: &str = "/demo.v1.Users/Signup";
const PROFILE: &str = "/demo.v1.Users/Profile";
const PUBLIC: &str = "/demo.v1.Users/Ping";
const AUDIT: &str = "/demo.v1.Users/Audit";

#[derive(Debug, Clone, Serialize)]
struct SignupRequest {
    email: String,
}

#[derive(Debug, Clone, Serialize)]
struct SignupReply {
    user_id: u64,
}

/// Accepts only the `good-signature` credential and counts invocations
#[derive(Default)]
struct SignatureValidator {
    calls: AtomicUsize,
}

#[async_trait]
impl ProxyAuthorizationValidator for SignatureValidator {
    async fn verify(
        &self,
        proxy_authorization: &str,
        payload: &Payload,
    ) -> Result<bool, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!payload.journal_id().is_empty());
        match proxy_authorization {
            "good-signature" => Ok(true),
            "" => Err(ValidationError::new("missing signature")),
            _ => Ok(false),
        }
    }
}

struct Fixture {
    interceptor: ServerInterceptor,
    journal: Arc<MemoryJournalSink>,
    metrics: Arc<MemoryMetrics>,
    signatures: Arc<SignatureValidator>,
}

struct SharedSignatures(Arc<SignatureValidator>);

#[async_trait]
impl ProxyAuthorizationValidator for SharedSignatures {
    async fn verify(
        &self,
        proxy_authorization: &str,
        payload: &Payload,
    ) -> Result<bool, ValidationError> {
        self.0.verify(proxy_authorization, payload).await
    }
}

fn fixture() -> Fixture {
    let signatures = Arc::new(SignatureValidator::default());
    let validators = Arc::new(ValidatorRegistry::new());
    validators.register_proxy_auth("v1", SharedSignatures(signatures.clone()));
    validators.register_auth("bearer", |credential: &str, _payload: &Payload| {
        match credential.strip_prefix("Bearer ") {
            Some(user) if !user.is_empty() => Ok(Arc::new(user.to_string()) as Identity),
            _ => Err(ValidationError::new("invalid bearer token")),
        }
    });
    validators.register_auth(
        "exploding",
        |_credential: &str, _payload: &Payload| -> Result<Identity, ValidationError> {
            panic!("validator exploded")
        },
    );

    let descriptors = Arc::new(DescriptorRegistry::new(validators));
    descriptors
        .parse(
            &ServiceDescriptor::new("demo.v1.Users")
                .method(
                    "Signup",
                    MethodOptions {
                        proxy_authorization: Some("v1".into()),
                        journal: true,
                        metrics_alias: Some("signup".into()),
                        ..Default::default()
                    },
                )
                .method(
                    "Profile",
                    MethodOptions {
                        authorization: Some("bearer".into()),
                        journal: true,
                        http: Some(HttpRule::Get("/v1/profile".into())),
                        ..Default::default()
                    },
                )
                .method("Ping", MethodOptions::default())
                .method(
                    "Audit",
                    MethodOptions {
                        authorization: Some("exploding".into()),
                        journal: true,
                        ..Default::default()
                    },
                ),
        )
        .unwrap();

    let journal = Arc::new(MemoryJournalSink::new());
    let metrics = Arc::new(MemoryMetrics::new());
    let interceptor =
        ServerInterceptor::new(descriptors, metrics.clone()).with_journal_sink(journal.clone());

    Fixture {
        interceptor,
        journal,
        metrics,
        signatures,
    }
}

fn signup_request(signature: &str) -> Request<SignupRequest> {
    let mut request = Request::new(SignupRequest {
        email: "ada@example.com".into(),
    });
    if !signature.is_empty() {
        request
            .metadata_mut()
            .insert(metadata::PROXY_AUTHORIZATION, signature.parse().unwrap());
    }
    request
}

async fn signup_handler(
    request: Request<SignupRequest>,
) -> Result<Response<SignupReply>, Status> {
    assert_eq!(request.get_ref().email, "ada@example.com");
    Ok(Response::new(SignupReply { user_id: 7 }))
}

async fn exploding_handler(
    _request: Request<SignupRequest>,
) -> Result<Response<SignupReply>, Status> {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_signup_success() {
    let fx = fixture();

    let response = fx
        .interceptor
        .unary(SIGNUP, signup_request("good-signature"), signup_handler)
        .await
        .unwrap();

    assert_eq!(response.get_ref().user_id, 7);
    let journal_id = response
        .metadata()
        .get(metadata::JOURNAL_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].id, journal_id);
    assert_eq!(records[0].response.code, "OK");
    assert_eq!(
        records[0].request.payload,
        Some(serde_json::json!({ "email": "ada@example.com" }))
    );
    assert_eq!(
        records[0].response.payload,
        Some(serde_json::json!({ "user_id": 7 }))
    );

    let latencies = fx.metrics.latencies();
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].0, "signup");
    assert!(fx.metrics.errors().is_empty());
}

#[tokio::test]
async fn test_signup_rejection() {
    let fx = fixture();
    let invoked = Arc::new(AtomicUsize::new(0));
    let seen = invoked.clone();

    let status = fx
        .interceptor
        .unary(SIGNUP, signup_request("forged"), move |request| {
            seen.fetch_add(1, Ordering::SeqCst);
            signup_handler(request)
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "PermissionDenied");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].response.code, "PermissionDenied");

    let errors = fx.metrics.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].method, "signup");
    assert_eq!(errors[0].code, "PermissionDenied");
    assert_eq!(errors[0].journal_id, records[0].id);
    assert!(fx.metrics.latencies().is_empty());
}

#[tokio::test]
async fn test_proxy_validator_error_keeps_message() {
    let fx = fixture();

    let status = fx
        .interceptor
        .unary(SIGNUP, signup_request(""), signup_handler)
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "missing signature");
}

#[tokio::test]
async fn test_authorization_error_is_unauthenticated() {
    let fx = fixture();
    let invoked = Arc::new(AtomicUsize::new(0));
    let seen = invoked.clone();

    let mut request = Request::new(());
    request
        .metadata_mut()
        .insert(metadata::AUTHORIZATION, "Basic abc".parse().unwrap());

    let status = fx
        .interceptor
        .unary(PROFILE, request, move |_request: Request<()>| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok(Response::new(())) }
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "invalid bearer token");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(fx.metrics.errors()[0].method, "get /v1/profile");
}

#[tokio::test]
async fn test_identity_reaches_handler() {
    let fx = fixture();

    let mut request = Request::new(());
    request
        .metadata_mut()
        .insert(metadata::AUTHORIZATION, "Bearer ada".parse().unwrap());

    let response = fx
        .interceptor
        .unary(PROFILE, request, |request: Request<()>| async move {
            let user = session_identity::<_, String>(&request).cloned();
            Ok(Response::new(user))
        })
        .await
        .unwrap();

    assert_eq!(response.get_ref().as_deref(), Some("ada"));
}

#[tokio::test]
async fn test_open_method_builds_no_payload() {
    let fx = fixture();

    fx.interceptor
        .unary(PUBLIC, signup_request("forged"), signup_handler)
        .await
        .unwrap();
    fx.interceptor
        .unary("/demo.v1.Unknown/Call", signup_request(""), signup_handler)
        .await
        .unwrap();

    assert_eq!(fx.signatures.calls.load(Ordering::SeqCst), 0);
    assert!(fx.journal.records().is_empty());
    let names: Vec<String> = fx.metrics.latencies().into_iter().map(|(m, _)| m).collect();
    assert_eq!(names, vec![PUBLIC.to_string(), "/demo.v1.Unknown/Call".to_string()]);
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_with_stack() {
    let fx = fixture();
    let interceptor = fx.interceptor.clone();

    let outcome = tokio::spawn(async move {
        interceptor
            .unary(SIGNUP, signup_request("good-signature"), exploding_handler)
            .await
    })
    .await;

    let status = outcome.expect("task survives the panic").unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().starts_with("got panic => journal_id: "));
    assert!(status.message().ends_with("error: handler exploded"));
    assert!(!stack_trace(&status).unwrap_or_default().is_empty());

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response.code, "Internal");
    assert_eq!(records[0].response.details.len(), 1);
    assert_eq!(fx.metrics.errors()[0].code, "Internal");
}

#[tokio::test]
async fn test_validator_panic_becomes_internal_with_stack() {
    let fx = fixture();
    let invoked = Arc::new(AtomicUsize::new(0));
    let seen = invoked.clone();

    let mut request = signup_request("");
    request
        .metadata_mut()
        .insert(metadata::AUTHORIZATION, "Bearer ada".parse().unwrap());

    let status = fx
        .interceptor
        .unary(AUDIT, request, move |request: Request<SignupRequest>| async move {
            seen.fetch_add(1, Ordering::SeqCst);
            signup_handler(request).await
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().starts_with("got panic => journal_id: "));
    assert!(status.message().ends_with("error: validator exploded"));
    assert!(!stack_trace(&status).unwrap_or_default().is_empty());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].request.method, AUDIT);
    assert_eq!(records[0].response.code, "Internal");
    assert_eq!(fx.metrics.errors().len(), 1);
}

/// Log layer whose backend fails on every error-level event
struct FailingErrorLog;

impl<S: tracing::Subscriber> Layer<S> for FailingErrorLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            panic!("log backend failed");
        }
    }
}

#[tokio::test]
async fn test_recovery_survives_failing_error_log() {
    let fx = fixture();
    let _log = tracing::subscriber::set_default(tracing_subscriber::registry().with(FailingErrorLog));

    let status = fx
        .interceptor
        .unary(SIGNUP, signup_request("good-signature"), exploding_handler)
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().starts_with("got double panic => journal_id: "));
    assert!(status.metadata().get(metadata::JOURNAL_ID).is_some());

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response.code, "Internal");
    assert_eq!(fx.metrics.errors().len(), 1);
    assert_eq!(fx.metrics.errors()[0].code, "Internal");
}

#[tokio::test]
async fn test_concurrent_journal_ids_are_distinct() {
    let fx = fixture();

    let calls: Vec<_> = (0..32)
        .map(|_| {
            let interceptor = fx.interceptor.clone();
            tokio::spawn(async move {
                let response = interceptor
                    .unary(SIGNUP, signup_request("good-signature"), signup_handler)
                    .await
                    .unwrap();
                response
                    .metadata()
                    .get(metadata::JOURNAL_ID)
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_string()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for call in calls {
        let id = call.await.unwrap();
        assert!(!id.is_empty());
        ids.insert(id);
    }
    assert_eq!(ids.len(), 32);
    assert_eq!(fx.journal.records().len(), 32);
}

#[tokio::test]
async fn test_journal_metadata_is_allow_listed() {
    let fx = fixture();

    let mut request = signup_request("good-signature");
    request
        .metadata_mut()
        .insert("x-debug", "verbose".parse().unwrap());
    request
        .metadata_mut()
        .insert(metadata::X_FORWARDED_FOR, "10.0.0.1".parse().unwrap());

    fx.interceptor
        .unary(SIGNUP, request, signup_handler)
        .await
        .unwrap();

    let records = fx.journal.records();
    let logged = &records[0].request.metadata;
    assert!(logged.keys().all(|key| LOGGED_METADATA.contains(&key.as_str())));
    assert!(!logged.contains_key("x-debug"));
    assert_eq!(logged.get(metadata::X_FORWARDED_FOR).map(String::as_str), Some("10.0.0.1"));
    assert_eq!(
        logged.get(metadata::PROXY_AUTHORIZATION).map(String::as_str),
        Some("good-signature")
    );
}

#[tokio::test]
async fn test_cancelled_call_emits_one_record() {
    let fx = fixture();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        fx.interceptor.unary(SIGNUP, signup_request("good-signature"), |_request| {
            std::future::pending::<Result<Response<SignupReply>, Status>>()
        }),
    )
    .await;
    assert!(outcome.is_err());

    let records = fx.journal.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].response.code, "Canceled");

    let errors = fx.metrics.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "Canceled");
    assert_eq!(errors[0].method, "signup");
}

struct ExplodingSink;

impl JournalSink for ExplodingSink {
    fn emit(&self, _record: &JournalRecord) {
        panic!("journal backend unavailable")
    }
}

#[tokio::test]
async fn test_completion_panic_becomes_double_panic() {
    let fx = fixture();
    let metrics = fx.metrics.clone();
    let interceptor = fx.interceptor.with_journal_sink(Arc::new(ExplodingSink));

    let status = interceptor
        .unary(SIGNUP, signup_request("good-signature"), signup_handler)
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().starts_with("got double panic => journal_id: "));
    assert!(status.metadata().get(metadata::JOURNAL_ID).is_some());
    assert!(stack_trace(&status).is_some());

    let errors = metrics.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "Internal");
    assert_eq!(errors[0].method, "signup");
    assert!(errors[0].error.starts_with("got double panic => journal_id: "));
    assert!(metrics.latencies().is_empty());
}
