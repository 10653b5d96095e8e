//! Batched persistence
//!
//! A dedicated task drains the record channel and flushes to the store in
//! bounded-size or bounded-time batches, decoupling slow store writes
//! from the fast receive loop. A batch that keeps failing is dropped and
//! counted: continuity is worth more than completeness when the store is
//! down, and the receive path must never back up behind it.

use crate::config::WriterConfig;
use crate::feed::TickerRecord;
use crate::metrics::IngestMetrics;
use crate::store::TickerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub struct BatchWriter<S: TickerStore> {
    config: WriterConfig,
    entry_ttl: Duration,
    store: S,
    metrics: Arc<IngestMetrics>,
    rx: mpsc::Receiver<TickerRecord>,
    shutdown: watch::Receiver<bool>,
}

impl<S: TickerStore> BatchWriter<S> {
    pub fn new(
        config: WriterConfig,
        entry_ttl: Duration,
        store: S,
        metrics: Arc<IngestMetrics>,
        rx: mpsc::Receiver<TickerRecord>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            entry_ttl,
            store,
            metrics,
            rx,
            shutdown,
        }
    }

    /// Run until the ingest side closes the channel or shutdown is
    /// signalled. Buffered records are flushed before returning.
    pub async fn run(self) {
        let Self {
            config,
            entry_ttl,
            mut store,
            metrics,
            mut rx,
            mut shutdown,
        } = self;

        let mut buffer: Vec<TickerRecord> = Vec::with_capacity(config.batch_size);
        let mut flush_timer =
            tokio::time::interval(Duration::from_millis(config.flush_interval_ms));
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                record = rx.recv() => {
                    match record {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= config.batch_size {
                                flush(&mut store, &metrics, &config, entry_ttl, &mut buffer).await;
                                flush_timer.reset();
                            }
                        }
                        None => break,
                    }
                }

                _ = flush_timer.tick() => {
                    if !buffer.is_empty() {
                        flush(&mut store, &metrics, &config, entry_ttl, &mut buffer).await;
                    }
                }

                _ = shutdown.changed() => break,
            }
        }

        // Drain whatever the receive loop managed to queue before it
        // stopped, then flush the remainder.
        while let Ok(record) = rx.try_recv() {
            buffer.push(record);
            if buffer.len() >= config.batch_size {
                flush(&mut store, &metrics, &config, entry_ttl, &mut buffer).await;
            }
        }
        if !buffer.is_empty() {
            flush(&mut store, &metrics, &config, entry_ttl, &mut buffer).await;
        }
        tracing::info!("Batch writer stopped");
    }
}

/// Write one batch, retrying with a linearly increasing delay. After the
/// last attempt the batch is dropped and its size added to the drop
/// counter; the next batch gets a fresh start.
async fn flush<S: TickerStore>(
    store: &mut S,
    metrics: &IngestMetrics,
    config: &WriterConfig,
    entry_ttl: Duration,
    buffer: &mut Vec<TickerRecord>,
) {
    let count = buffer.len();

    for attempt in 1..=config.retry_attempts.max(1) {
        match store.write_batch(buffer, entry_ttl).await {
            Ok(()) => {
                metrics.records_written(count as u64);
                tracing::debug!(records = count, "Batch flushed");
                buffer.clear();
                return;
            }
            Err(e) => {
                metrics.store_error();
                tracing::warn!(
                    attempt,
                    records = count,
                    error = %e,
                    "Batch write failed"
                );
                if attempt < config.retry_attempts {
                    let delay = Duration::from_millis(config.retry_delay_ms) * attempt;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    metrics.records_dropped(count as u64);
    tracing::error!(records = count, "Dropping batch after exhausted retries");
    buffer.clear();
}
