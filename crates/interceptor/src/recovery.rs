// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! # Panic Recovery
//!
//! ## Purpose
//! Converts a panic caught at a call boundary into an `Internal` status that
//! carries the panic message, the journal id and the stack trace as a
//! structured error detail.
//!
//! ## Error Details
//! Details use the `google.rpc.Status` layout: the status bytes hold an
//! [`RpcStatus`] whose `details` contain one `Any`-packed [`Stack`] message.
//!
//! ## Stack Capture
//! `catch_unwind` only hands back the panic payload, so a process-wide panic
//! hook records the backtrace of the panicking thread first. The hook chains
//! to whatever hook was installed before it. When no trace was recorded
//! (hook not installed, or the payload came from elsewhere) the trace of the
//! recovery site is used instead, so the detail is never empty.
//!
//! Nothing in this module can itself unwind: payload destructors of unknown
//! type are leaked rather than run.

use crate::metadata::JournalId;
use bytes::Bytes;
use prost::Message;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;
use tonic::{Code, Status};

/// Type URL of the packed [`Stack`] detail
pub const STACK_TYPE_URL: &str = "type.googleapis.com/callward.interceptor.v1.Stack";

/// Stack trace attached to `Internal` statuses produced by a panic
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Stack {
    /// Formatted backtrace
    #[prost(string, tag = "1")]
    pub info: String,
}

/// Wire layout of `google.rpc.Status`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    /// Status code
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing message
    #[prost(string, tag = "2")]
    pub message: String,
    /// Packed error details
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

thread_local! {
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install the backtrace-recording panic hook (idempotent)
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = LAST_PANIC_TRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(trace);
                }
            });
            previous(info);
        }));
    });
}

fn take_panic_trace() -> String {
    LAST_PANIC_TRACE
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
        .filter(|trace| !trace.is_empty())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Render a panic payload as text, consuming it
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(other) => {
                // Unknown payload types may panic in Drop
                std::mem::forget(other);
                "non-string panic payload".to_string()
            }
        },
    }
}

/// Build an `Internal` status whose details carry `trace`
pub fn internal_with_stack(message: String, trace: String) -> Status {
    let stack = Stack { info: trace };
    let details = RpcStatus {
        code: Code::Internal as i32,
        message: message.clone(),
        details: vec![prost_types::Any {
            type_url: STACK_TYPE_URL.to_string(),
            value: stack.encode_to_vec(),
        }],
    };
    Status::with_details(Code::Internal, message, Bytes::from(details.encode_to_vec()))
}

/// Status for a panic raised by a validator or the handler
pub fn panic_status(journal_id: &JournalId, payload: Box<dyn Any + Send>) -> Status {
    let trace = take_panic_trace();
    internal_with_stack(
        format!(
            "got panic => journal_id: {}, error: {}",
            journal_id,
            panic_message(payload)
        ),
        trace,
    )
}

/// Status for a panic raised while completing a call (journal, metrics)
pub fn double_panic_status(journal_id: &JournalId, payload: Box<dyn Any + Send>) -> Status {
    let trace = take_panic_trace();
    internal_with_stack(
        format!(
            "got double panic => journal_id: {}, error: {}",
            journal_id,
            panic_message(payload)
        ),
        trace,
    )
}

/// Decode the error details of a status, if it carries any
pub fn decode_details(status: &Status) -> Option<RpcStatus> {
    if status.details().is_empty() {
        return None;
    }
    RpcStatus::decode(status.details()).ok()
}

/// Stack trace held by one packed detail, if it is a [`Stack`]
pub fn stack_trace_of(detail: &prost_types::Any) -> Option<String> {
    if detail.type_url != STACK_TYPE_URL {
        return None;
    }
    Stack::decode(detail.value.as_slice())
        .ok()
        .map(|stack| stack.info)
}

/// Stack trace attached to a recovered panic
pub fn stack_trace(status: &Status) -> Option<String> {
    decode_details(status)?.details.iter().find_map(stack_trace_of)
}
