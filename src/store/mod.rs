//! Key-value store interface
//!
//! The core needs exactly two primitives: "set multiple fields of a key
//! with a TTL, in bulk" and "read all fields of a key". No cross-key
//! transactions; last write wins per key.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::StoreError;
use crate::feed::TickerRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Key prefix for ticker entries
pub const KEY_PREFIX: &str = "option:";

/// Store key for a symbol's entry
pub fn entry_key(symbol: &str) -> String {
    format!("{}{}", KEY_PREFIX, symbol)
}

/// Persistence seam for the batch writer
#[async_trait]
pub trait TickerStore: Send {
    /// Write all records as one bulk operation, setting or refreshing each
    /// entry's TTL in the same operation. The bulk write is atomic from
    /// the store's point of view even though individual record writes are
    /// not cross-record transactional.
    async fn write_batch(
        &mut self,
        records: &[TickerRecord],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Read all fields of one symbol's entry; `None` if absent or expired
    async fn read_entry(
        &mut self,
        symbol: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_key() {
        assert_eq!(entry_key("BTC-27JUN25-60000-C"), "option:BTC-27JUN25-60000-C");
    }
}
