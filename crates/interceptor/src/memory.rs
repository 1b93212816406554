// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>

//! In-memory sinks
//!
//! Record journal entries and metric observations in memory. Used by tests
//! and by embedders that forward records elsewhere in batches.

use crate::journal::{JournalRecord, JournalSink};
use crate::metrics::MetricsSink;
use parking_lot::Mutex;

/// Journal sink keeping every record
#[derive(Debug, Default)]
pub struct MemoryJournalSink {
    records: Mutex<Vec<JournalRecord>>,
}

impl MemoryJournalSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted so far
    pub fn records(&self) -> Vec<JournalRecord> {
        self.records.lock().clone()
    }

    /// Remove and return all records
    pub fn drain(&self) -> Vec<JournalRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl JournalSink for MemoryJournalSink {
    fn emit(&self, record: &JournalRecord) {
        self.records.lock().push(record.clone());
    }
}

/// One failed-call observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorObservation {
    /// Logical method name
    pub method: String,
    /// Canonical status code name
    pub code: String,
    /// Status message
    pub error: String,
    /// Journal id of the call
    pub journal_id: String,
}

/// Metrics sink keeping every observation
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    latencies: Mutex<Vec<(String, f64)>>,
    errors: Mutex<Vec<ErrorObservation>>,
}

impl MemoryMetrics {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// `(method, seconds)` of successful calls
    pub fn latencies(&self) -> Vec<(String, f64)> {
        self.latencies.lock().clone()
    }

    /// Failed-call observations
    pub fn errors(&self) -> Vec<ErrorObservation> {
        self.errors.lock().clone()
    }
}

impl MetricsSink for MemoryMetrics {
    fn observe_latency(&self, method: &str, seconds: f64) {
        self.latencies.lock().push((method.to_string(), seconds));
    }

    fn record_error(&self, method: &str, code: &str, error: &str, journal_id: &str) {
        self.errors.lock().push(ErrorObservation {
            method: method.to_string(),
            code: code.to_string(),
            error: error.to_string(),
            journal_id: journal_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{self, RequestSnapshot};
    use crate::metadata::JournalId;

    fn record(method: &str) -> JournalRecord {
        journal::compose(&JournalId::generate(), method, RequestSnapshot::default(), Ok(None), 0.0)
    }

    #[test]
    fn test_drain_hands_over_each_record_once() {
        let sink = MemoryJournalSink::new();
        sink.emit(&record("/demo.v1.Users/Signup"));
        sink.emit(&record("/demo.v1.Users/Profile"));

        let batch = sink.drain();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].request.method, "/demo.v1.Users/Signup");
        assert!(sink.records().is_empty());
        assert!(sink.drain().is_empty());

        sink.emit(&record("/demo.v1.Users/Ping"));
        let batch = sink.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].request.method, "/demo.v1.Users/Ping");
    }

    #[test]
    fn test_metrics_split_success_and_failure() {
        let metrics = MemoryMetrics::new();
        metrics.observe_latency("signup", 0.5);
        metrics.record_error("signup", "PermissionDenied", "forged", "abc");

        assert_eq!(metrics.latencies(), vec![("signup".to_string(), 0.5)]);
        assert_eq!(
            metrics.errors(),
            vec![ErrorObservation {
                method: "signup".into(),
                code: "PermissionDenied".into(),
                error: "forged".into(),
                journal_id: "abc".into(),
            }]
        );
    }
}
