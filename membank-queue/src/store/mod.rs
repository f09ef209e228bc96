//! Shared queue store abstraction.
//!
//! The producer and the worker pool share no memory; everything they
//! exchange goes through a [`QueueStore`]. A store offers two things:
//!
//! - a priority-ordered collection whose "pop highest" is atomic across
//!   concurrent callers, and
//! - a key/value space with per-key expiration for job snapshots and results.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::QueueResult;
use async_trait::async_trait;
use std::time::Duration;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,
    /// Key exists without an expiration
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

/// A write that is part of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Insert a member into a sorted collection
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Set a key with an expiration
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
}

/// Store backing a job queue.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Add a member to a sorted collection.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> QueueResult<()>;

    /// Atomically remove and return the member with the highest score.
    ///
    /// No two callers may ever receive the same member.
    async fn zpopmax(&self, key: &str) -> QueueResult<Option<(String, f64)>>;

    /// Number of members in a sorted collection.
    async fn zcard(&self, key: &str) -> QueueResult<usize>;

    /// Get a value.
    async fn get(&self, key: &str) -> QueueResult<Option<String>>;

    /// Set a value without expiration.
    async fn set(&self, key: &str, value: &str) -> QueueResult<()>;

    /// Set a value with an expiration.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> QueueResult<bool>;

    /// List keys matching a glob pattern (`prefix*`).
    async fn keys(&self, pattern: &str) -> QueueResult<Vec<String>>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> QueueResult<KeyTtl>;

    /// Set the expiration of an existing key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> QueueResult<bool>;

    /// Apply every operation or none of them.
    async fn exec_atomic(&self, ops: Vec<StoreOp>) -> QueueResult<()>;
}
