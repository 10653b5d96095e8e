//! Redis-backed ticker store
//!
//! One pipelined round trip per batch: HSET of every present field plus
//! EXPIRE for each record. The connection manager handle reconnects on its
//! own; every operation still carries an explicit timeout so a wedged
//! store can never stall the writer indefinitely.

use super::{entry_key, TickerStore};
use crate::error::StoreError;
use crate::feed::TickerRecord;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis. Fails fast: an unreachable store at startup is an
    /// initialization error, not something to ingest into.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = match tokio::time::timeout(op_timeout, ConnectionManager::new(client)).await {
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
            Ok(conn) => conn?,
        };
        Ok(Self { conn, op_timeout })
    }
}

#[async_trait]
impl TickerStore for RedisStore {
    async fn write_batch(
        &mut self,
        records: &[TickerRecord],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();

        for record in records {
            let key = entry_key(&record.symbol);
            pipe.hset_multiple(&key, &record.store_fields()).ignore();
            pipe.expire(&key, ttl.as_secs() as i64).ignore();
        }

        match tokio::time::timeout(self.op_timeout, pipe.query_async(&mut self.conn)).await {
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
            Ok(result) => {
                let () = result?;
                Ok(())
            }
        }
    }

    async fn read_entry(
        &mut self,
        symbol: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError> {
        let key = entry_key(symbol);
        let query = self.conn.hgetall(key);
        let map: HashMap<String, String> = match tokio::time::timeout(self.op_timeout, query).await
        {
            Err(_) => return Err(StoreError::Timeout(self.op_timeout)),
            Ok(result) => result?,
        };
        Ok(if map.is_empty() { None } else { Some(map) })
    }
}
