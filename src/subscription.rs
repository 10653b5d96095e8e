//! Subscription chunk scheduling
//!
//! Partitions the symbol set into bounded chunks, paces subscribe requests
//! to stay under upstream rate limits, and tracks per-chunk retries. A
//! rejected chunk is retried a bounded number of times with increasing
//! delay, then its symbols are deferred until the next full
//! re-subscription pass instead of blocking the rest of the schedule.

use crate::config::SubscriptionConfig;
use crate::error::SubscriptionError;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Partition `symbols` into ordered chunks of at most `chunk_size`.
///
/// Every symbol appears in exactly one chunk; chunk boundaries carry no
/// meaning once subscription succeeds.
pub fn build_chunks(symbols: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    symbols
        .chunks(chunk_size)
        .map(|c| c.to_vec())
        .collect()
}

/// Subscribe control message, one per chunk
#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    op: &'static str,
    args: Vec<String>,
    req_id: &'a str,
}

/// A chunk awaiting submission
#[derive(Debug, Clone)]
struct PendingChunk {
    symbols: Vec<String>,
    attempts: u32,
    not_before: Option<Instant>,
}

/// Tracks the subscribe schedule across the Subscribing phase and beyond.
///
/// Owned by the connection-manager task; subscription control messages
/// share the transport with the receive loop, so nothing here is shared
/// across threads.
#[derive(Debug)]
pub struct ChunkScheduler {
    config: SubscriptionConfig,
    pending: VecDeque<PendingChunk>,
    inflight: HashMap<String, PendingChunk>,
    /// Symbols from exhausted chunks, picked up by the next full pass
    deferred: Vec<String>,
    next_req_id: u64,
}

impl ChunkScheduler {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            inflight: HashMap::new(),
            deferred: Vec::new(),
            next_req_id: 0,
        }
    }

    /// Start a full (re-)subscription pass over `symbols`.
    ///
    /// Idempotent by construction: the previous schedule, in-flight
    /// requests, and deferred symbols are discarded, and subscribing twice
    /// to the same topic is harmless upstream.
    pub fn begin_full_pass(&mut self, symbols: &[String]) {
        self.pending.clear();
        self.inflight.clear();
        self.deferred.clear();
        self.enqueue(symbols);
    }

    /// Queue newly listed symbols without touching existing subscriptions
    pub fn add_symbols(&mut self, symbols: &[String]) {
        self.enqueue(symbols);
    }

    fn enqueue(&mut self, symbols: &[String]) {
        for chunk in build_chunks(symbols, self.config.chunk_size) {
            self.pending.push_back(PendingChunk {
                symbols: chunk,
                attempts: 0,
                not_before: None,
            });
        }
    }

    /// Minimum delay to keep between successive chunk submissions
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.config.chunk_delay_ms)
    }

    /// True once every chunk has been submitted at least once. Retries of
    /// rejected chunks may still be outstanding; they do not hold the
    /// connection out of the Live state.
    pub fn all_submitted(&self) -> bool {
        self.pending.iter().all(|c| c.attempts > 0)
    }

    /// Pop the next chunk that is ready to send, if any.
    ///
    /// Returns the request id and the serialized subscribe message. The
    /// chunk moves to the in-flight set until its ack arrives.
    pub fn next_ready(&mut self, now: Instant) -> Option<(String, String)> {
        let ready_at = self
            .pending
            .iter()
            .position(|c| c.not_before.map_or(true, |t| t <= now))?;
        let mut chunk = self.pending.remove(ready_at)?;
        chunk.attempts += 1;

        self.next_req_id += 1;
        let req_id = format!("sub-{}", self.next_req_id);

        let request = SubscribeRequest {
            op: "subscribe",
            args: chunk.symbols.iter().map(|s| format!("tickers.{}", s)).collect(),
            req_id: &req_id,
        };
        // Serialization of a struct of strings cannot fail
        let json = serde_json::to_string(&request).expect("serialize subscribe request");

        self.inflight.insert(req_id.clone(), chunk);
        Some((req_id, json))
    }

    /// Earliest instant at which a retry-delayed chunk becomes ready
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.pending.iter().filter_map(|c| c.not_before).min()
    }

    /// True while anything is still queued or awaiting an ack
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Handle a subscribe ack for `req_id`.
    ///
    /// On rejection the chunk is requeued with a linearly increasing delay
    /// until its attempts are exhausted, at which point its symbols are
    /// deferred and the error is returned for counting.
    pub fn handle_ack(
        &mut self,
        req_id: &str,
        success: bool,
        ret_msg: Option<&str>,
        now: Instant,
    ) -> Result<(), SubscriptionError> {
        let Some(chunk) = self.inflight.remove(req_id) else {
            // Ack for a request from before the last reconnect; ignore.
            return Ok(());
        };

        if success {
            return Ok(());
        }

        tracing::warn!(
            req_id,
            attempt = chunk.attempts,
            symbols = chunk.symbols.len(),
            reason = ret_msg.unwrap_or("unknown"),
            "Subscribe chunk rejected"
        );

        if chunk.attempts >= self.config.retry_attempts {
            let err = SubscriptionError::Deferred {
                symbols: chunk.symbols.len(),
                attempts: chunk.attempts,
            };
            self.deferred.extend(chunk.symbols);
            return Err(err);
        }

        let delay = Duration::from_millis(self.config.chunk_delay_ms)
            * (chunk.attempts + 1);
        self.pending.push_back(PendingChunk {
            not_before: Some(now + delay),
            ..chunk
        });
        Err(SubscriptionError::Rejected {
            req_id: req_id.to_string(),
            reason: ret_msg.unwrap_or("unknown").to_string(),
        })
    }

    /// Symbols waiting for the next full pass
    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("BTC-27JUN25-{}-C", 50_000 + i * 500)).collect()
    }

    fn scheduler(chunk_size: usize) -> ChunkScheduler {
        ChunkScheduler::new(SubscriptionConfig {
            chunk_size,
            chunk_delay_ms: 100,
            retry_attempts: 3,
        })
    }

    #[test]
    fn test_build_chunks_partitions_exactly() {
        for (count, size) in [(0, 10), (1, 10), (10, 10), (11, 10), (95, 10), (7, 25)] {
            let input = symbols(count);
            let chunks = build_chunks(&input, size);

            let flattened: Vec<String> = chunks.iter().flatten().cloned().collect();
            assert_eq!(flattened, input, "no symbol omitted, duplicated, or reordered");
            assert!(chunks.iter().all(|c| c.len() <= size && !c.is_empty()));
        }
    }

    #[test]
    fn test_build_chunks_sizes() {
        let chunks = build_chunks(&symbols(23), 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(chunks[2].len(), 3);
    }

    #[test]
    fn test_next_ready_drains_in_order() {
        let mut sched = scheduler(2);
        sched.begin_full_pass(&symbols(5));
        let now = Instant::now();

        let mut requests = Vec::new();
        while let Some((req_id, json)) = sched.next_ready(now) {
            requests.push((req_id, json));
        }

        assert_eq!(requests.len(), 3);
        assert!(requests[0].1.contains("tickers.BTC-27JUN25-50000-C"));
        assert!(requests[0].1.contains(r#""op":"subscribe""#));
        assert!(!sched.has_pending());
        assert!(sched.all_submitted());
    }

    #[test]
    fn test_successful_ack_clears_inflight() {
        let mut sched = scheduler(10);
        sched.begin_full_pass(&symbols(3));
        let now = Instant::now();

        let (req_id, _) = sched.next_ready(now).unwrap();
        assert!(sched.handle_ack(&req_id, true, None, now).is_ok());
        assert!(sched.deferred().is_empty());
    }

    #[test]
    fn test_rejected_chunk_retries_with_increasing_delay() {
        let mut sched = scheduler(10);
        sched.begin_full_pass(&symbols(3));
        let now = Instant::now();

        let (req_id, _) = sched.next_ready(now).unwrap();
        let err = sched.handle_ack(&req_id, false, Some("rate limited"), now);
        assert!(matches!(err, Err(SubscriptionError::Rejected { .. })));

        // Not ready immediately; ready after the retry delay.
        assert!(sched.next_ready(now).is_none());
        let retry_at = sched.next_retry_at().unwrap();
        assert!(retry_at > now);
        assert!(sched.next_ready(retry_at).is_some());
    }

    #[test]
    fn test_exhausted_chunk_defers_symbols() {
        let mut sched = scheduler(10);
        sched.begin_full_pass(&symbols(3));
        let mut now = Instant::now();

        for attempt in 1..=3 {
            let (req_id, _) = sched.next_ready(now + Duration::from_secs(attempt)).unwrap();
            let result = sched.handle_ack(&req_id, false, Some("bad topic"), now);
            if attempt == 3 {
                assert!(matches!(result, Err(SubscriptionError::Deferred { symbols: 3, .. })));
            } else {
                assert!(matches!(result, Err(SubscriptionError::Rejected { .. })));
            }
            now += Duration::from_secs(10);
        }

        assert_eq!(sched.deferred().len(), 3);
        // Deferred symbols do not re-enter the schedule on their own.
        assert!(sched.next_ready(now + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_full_pass_resets_deferrals() {
        let mut sched = scheduler(10);
        sched.begin_full_pass(&symbols(3));
        let mut now = Instant::now();

        // Exhaust the chunk so its symbols end up deferred.
        for _ in 0..3 {
            now += Duration::from_secs(10);
            let (req_id, _) = sched.next_ready(now).unwrap();
            let _ = sched.handle_ack(&req_id, false, None, now);
        }
        assert_eq!(sched.deferred().len(), 3);

        // The next full pass covers the whole set again.
        sched.begin_full_pass(&symbols(3));
        assert!(sched.deferred().is_empty());
        assert!(sched.has_pending());
    }

    #[test]
    fn test_stale_ack_ignored() {
        let mut sched = scheduler(10);
        sched.begin_full_pass(&symbols(3));
        let now = Instant::now();

        let (req_id, _) = sched.next_ready(now).unwrap();
        sched.begin_full_pass(&symbols(3)); // reconnect happened

        // Ack from the old connection must not panic or defer anything.
        assert!(sched.handle_ack(&req_id, false, None, now).is_ok());
        assert!(sched.deferred().is_empty());
    }

    #[test]
    fn test_add_symbols_is_incremental() {
        let mut sched = scheduler(2);
        sched.begin_full_pass(&symbols(2));
        let now = Instant::now();
        let _ = sched.next_ready(now);
        assert!(!sched.has_pending());

        sched.add_symbols(&["ETH-1AUG25-3000-P".to_string()]);
        let (_, json) = sched.next_ready(now).unwrap();
        assert!(json.contains("tickers.ETH-1AUG25-3000-P"));
    }
}
