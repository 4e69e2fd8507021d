//! Redis cache store.

use std::time::Duration;

use async_trait::async_trait;
use ::redis::Client;
use ::redis::aio::MultiplexedConnection;
use tracing::info;

use super::{CacheStore, ScanPage, StoreError, StoreOp, StoreResult};

/// A [`CacheStore`] backed by Redis.
///
/// Uses a multiplexed connection, so clones share one socket.
/// Deletes go through `UNLINK`, which frees memory off the main thread.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::new(StoreOp::Connect, e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::new(StoreOp::Connect, e))?;

        info!("Connected to Redis cache store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::new(StoreOp::Get, e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            // EX 0 is rejected by Redis
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }

        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::new(StoreOp::Set, e))?;
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let mut conn = self.conn.clone();
        let (cursor, keys): (u64, Vec<String>) = ::redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::new(StoreOp::Scan, e))?;
        Ok(ScanPage { cursor, keys })
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("UNLINK");
        for key in keys {
            cmd.arg(key);
        }

        let removed: u64 = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::new(StoreOp::Delete, e))?;
        Ok(removed)
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
