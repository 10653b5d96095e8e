//! In-memory ticker store
//!
//! Implements the same contract as the Redis store, including TTL expiry,
//! against a plain map. Used by tests and by local runs without a store.

use super::{entry_key, TickerStore};
use crate::error::StoreError;
use crate::feed::TickerRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Entry>,
    write_batches: u64,
}

#[derive(Debug)]
struct Entry {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bulk writes performed
    pub fn write_batches(&self) -> u64 {
        self.write_batches
    }

    /// Remaining TTL of an entry, if present and not expired
    pub fn ttl(&self, symbol: &str) -> Option<Duration> {
        let entry = self.entries.get(&entry_key(symbol))?;
        entry.expires_at.checked_duration_since(Instant::now())
    }
}

#[async_trait]
impl TickerStore for MemoryStore {
    async fn write_batch(
        &mut self,
        records: &[TickerRecord],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        for record in records {
            let entry = self
                .entries
                .entry(entry_key(&record.symbol))
                .or_insert_with(|| Entry {
                    fields: HashMap::new(),
                    expires_at,
                });
            for (field, value) in record.store_fields() {
                entry.fields.insert(field.to_string(), value);
            }
            // TTL refreshes on every write, like EXPIRE in the pipeline.
            entry.expires_at = expires_at;
        }
        self.write_batches += 1;
        Ok(())
    }

    async fn read_entry(
        &mut self,
        symbol: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError> {
        let key = entry_key(symbol);
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.fields.clone())),
            Some(_) => {
                self.entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
