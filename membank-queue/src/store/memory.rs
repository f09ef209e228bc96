//! In-process queue store.

use super::{KeyTtl, QueueStore, StoreOp};
use crate::error::QueueResult;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Queue store kept in process memory.
///
/// A single lock guards all state, which makes `zpopmax` and batches atomic.
/// Equal scores pop in insertion order. Expired keys are dropped lazily on
/// access. Cloning yields a handle to the same store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    sorted: HashMap<String, SortedSet>,
    values: HashMap<String, Entry>,
    next_seq: u64,
}

#[derive(Default)]
struct SortedSet {
    by_rank: BTreeMap<Rank, String>,
    ranks: HashMap<String, Rank>,
}

/// Highest score first, then insertion order.
#[derive(Debug, Clone, Copy)]
struct Rank {
    score: f64,
    seq: u64,
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl State {
    fn zadd(&mut self, key: &str, member: &str, score: f64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let set = self.sorted.entry(key.to_string()).or_default();
        if let Some(old) = set.ranks.remove(member) {
            set.by_rank.remove(&old);
        }
        let rank = Rank { score, seq };
        set.by_rank.insert(rank, member.to_string());
        set.ranks.insert(member.to_string(), rank);
    }

    fn set_ex(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.values.insert(key.to_string(), entry);
    }

    /// Live entry for a key, evicting it if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| e.is_expired(now)) {
            self.values.remove(key);
            return None;
        }
        self.values.get_mut(key)
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        self.state.lock().await.zadd(key, member, score);
        Ok(())
    }

    async fn zpopmax(&self, key: &str) -> QueueResult<Option<(String, f64)>> {
        let mut state = self.state.lock().await;
        let Some(set) = state.sorted.get_mut(key) else {
            return Ok(None);
        };

        let popped = set.by_rank.pop_first().map(|(rank, member)| {
            set.ranks.remove(&member);
            (member, rank.score)
        });
        if set.by_rank.is_empty() {
            state.sorted.remove(key);
        }
        Ok(popped)
    }

    async fn zcard(&self, key: &str) -> QueueResult<usize> {
        let state = self.state.lock().await;
        Ok(state.sorted.get(key).map_or(0, |set| set.by_rank.len()))
    }

    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        self.state.lock().await.set_ex(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        self.state.lock().await.set_ex(key, value, Some(ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let existed = state.live(key).is_some();
        state.values.remove(key);
        let was_sorted = state.sorted.remove(key).is_some();
        Ok(existed || was_sorted)
    }

    async fn keys(&self, pattern: &str) -> QueueResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.values.retain(|_, entry| !entry.is_expired(now));

        let mut keys: Vec<String> = state
            .values
            .keys()
            .chain(state.sorted.keys())
            .filter(|key| matches(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> QueueResult<KeyTtl> {
        let mut state = self.state.lock().await;
        let is_sorted = state.sorted.contains_key(key);
        let ttl = match state.live(key) {
            None if is_sorted => KeyTtl::Persistent,
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        };
        Ok(ttl)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        match state.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exec_atomic(&self, ops: Vec<StoreOp>) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        for op in ops {
            match op {
                StoreOp::ZAdd { key, member, score } => state.zadd(&key, &member, score),
                StoreOp::SetEx { key, value, ttl } => state.set_ex(&key, &value, Some(ttl)),
            }
        }
        Ok(())
    }
}
