//! Redis-backed queue store.

use membank_log::{debug, info};
use super::{KeyTtl, QueueStore, StoreOp};
use crate::error::{QueueError, QueueResult};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;

/// Queue store on top of a Redis sorted set and plain string keys.
///
/// `ZPOPMAX` provides the atomic claim; batches run inside `MULTI`/`EXEC`.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use membank_queue::store::RedisStore;
    ///
    /// # async fn example() -> membank_queue::QueueResult<()> {
    /// let store = RedisStore::connect("redis://localhost:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(redis_url: &str) -> QueueResult<Self> {
        debug!(url = %redis_url, "Connecting queue store");

        let client = Client::open(redis_url).map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;

        info!("Queue store connected");
        Ok(Self { connection })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

fn millis(duration: Duration) -> u64 {
    // PSETEX rejects 0; sub-millisecond TTLs round up.
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zpopmax(&self, key: &str) -> QueueResult<Option<(String, f64)>> {
        let mut conn = self.connection.clone();
        let popped: Vec<(String, f64)> = conn.zpopmax(key, 1).await?;
        Ok(popped.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let count: usize = conn.zcard(key).await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.pset_ex(key, value, millis(ttl)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> QueueResult<bool> {
        let mut conn = self.connection.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> QueueResult<KeyTtl> {
        let mut conn = self.connection.clone();
        let ttl_ms: i64 = conn.pttl(key).await?;

        let ttl = match ttl_ms {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        };
        Ok(ttl)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> QueueResult<bool> {
        let mut conn = self.connection.clone();
        let applied: bool = conn.pexpire(key, millis(ttl) as i64).await?;
        Ok(applied)
    }

    async fn exec_atomic(&self, ops: Vec<StoreOp>) -> QueueResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                StoreOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
                StoreOp::SetEx { key, value, ttl } => {
                    pipe.pset_ex(key, value, millis(*ttl)).ignore();
                }
            }
        }

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
