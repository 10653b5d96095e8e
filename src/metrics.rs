//! Ingestion metrics and health tracking
//!
//! A single struct of atomic counters shared behind `Arc`. Every stage of
//! the pipeline updates it; external collaborators (health endpoint,
//! alerting) read the snapshot and apply their own staleness thresholds.

use crate::ws::ConnState;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

/// Shared counters for the whole ingestion core.
///
/// All fields are atomics; updates never take a lock and never block the
/// receive loop.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    messages_received: AtomicU64,
    messages_normalized: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_backpressure: AtomicU64,
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    store_errors: AtomicU64,
    subscription_failures: AtomicU64,
    catalog_errors: AtomicU64,
    reconnects: AtomicU64,
    connection_state: AtomicU8,
    /// Unix millis; 0 means "never"
    last_message_ms: AtomicI64,
    last_write_ms: AtomicI64,
}

/// Read-only view of the counters at one point in time
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_normalized: u64,
    pub dropped_invalid: u64,
    pub dropped_backpressure: u64,
    pub records_written: u64,
    pub records_dropped: u64,
    pub store_errors: u64,
    pub subscription_failures: u64,
    pub catalog_errors: u64,
    pub reconnects: u64,
    pub connection_state: ConnState,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_write_at: Option<DateTime<Utc>>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn message_normalized(&self) {
        self.messages_normalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_invalid(&self) {
        self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_backpressure(&self) {
        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_written(&self, count: u64) {
        self.records_written.fetch_add(count, Ordering::Relaxed);
        self.last_write_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn records_dropped(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_failure(&self) {
        self.subscription_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn catalog_error(&self) {
        self.catalog_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: ConnState) {
        self.connection_state.store(state as u8, Ordering::Relaxed);
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.connection_state.load(Ordering::Relaxed))
    }

    /// Capture a consistent-enough view of all counters. Individual loads
    /// are relaxed; the snapshot is for health reporting, not accounting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_normalized: self.messages_normalized.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            subscription_failures: self.subscription_failures.load(Ordering::Relaxed),
            catalog_errors: self.catalog_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connection_state: self.state(),
            last_message_at: millis_to_datetime(self.last_message_ms.load(Ordering::Relaxed)),
            last_write_at: millis_to_datetime(self.last_write_ms.load(Ordering::Relaxed)),
        }
    }
}

impl MetricsSnapshot {
    /// Time since the last successful store write. `None` before the first
    /// write ever succeeds.
    pub fn write_staleness(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_write_at.map(|t| now - t)
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}
