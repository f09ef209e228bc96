//! Job producer: enqueue and snapshot lookups.

use membank_log::{debug, info};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobId, JobResult};
use crate::store::{QueueStore, StoreOp};
use std::sync::Arc;

/// Shared handle to a queue store.
pub type SharedStore = Arc<dyn QueueStore>;

/// Enqueues jobs and reads job snapshots and results.
#[derive(Clone)]
pub struct Producer {
    store: SharedStore,
    config: Arc<QueueConfig>,
}

impl Producer {
    /// Create a producer over a store.
    pub fn new(store: SharedStore, config: QueueConfig) -> Self {
        Self {
            store,
            config: Arc::new(config.normalized()),
        }
    }

    /// Get the queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Get the underlying store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Enqueue a job.
    ///
    /// Missing `id`, `created_at` and `max_retries` are filled in. The snapshot
    /// is written before the job becomes visible in the ready collection.
    pub async fn enqueue(&self, mut job: Job) -> QueueResult<JobId> {
        job.apply_defaults(self.config.max_retries);
        let data = encode(&job)?;

        self.store
            .set_ex(&self.config.job_key(&job.id), &data, self.config.result_ttl)
            .await?;
        self.store
            .zadd(&self.config.queue_key(), &data, job.score())
            .await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            retries = job.retries,
            "Job enqueued"
        );
        Ok(job.id)
    }

    /// Enqueue several jobs in one atomic store operation.
    ///
    /// Either every job is enqueued or none is.
    pub async fn enqueue_batch(&self, jobs: Vec<Job>) -> QueueResult<Vec<JobId>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let queue_key = self.config.queue_key();
        let mut ops = Vec::with_capacity(jobs.len() * 2);
        let mut ids = Vec::with_capacity(jobs.len());

        for mut job in jobs {
            job.apply_defaults(self.config.max_retries);
            let data = encode(&job).map_err(|e| {
                QueueError::Serialization(format!("job {}: {}", job.id, e))
            })?;

            ops.push(StoreOp::SetEx {
                key: self.config.job_key(&job.id),
                value: data.clone(),
                ttl: self.config.result_ttl,
            });
            ops.push(StoreOp::ZAdd {
                key: queue_key.clone(),
                member: data,
                score: job.score(),
            });
            ids.push(job.id);
        }

        self.store
            .exec_atomic(ops)
            .await
            .map_err(|e| QueueError::Store(format!("batch enqueue failed: {}", e)))?;

        info!(count = ids.len(), "Jobs batch enqueued");
        Ok(ids)
    }

    /// Get a job snapshot by id.
    pub async fn get_job(&self, job_id: &str) -> QueueResult<Job> {
        let data = self
            .store
            .get(&self.config.job_key(job_id))
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        serde_json::from_str(&data).map_err(|e| QueueError::Deserialization(e.to_string()))
    }

    /// Get the result of a processed job.
    pub async fn get_job_result(&self, job_id: &str) -> QueueResult<JobResult> {
        let data = self
            .store
            .get(&self.config.result_key(job_id))
            .await?
            .ok_or_else(|| QueueError::ResultNotFound(job_id.to_string()))?;

        serde_json::from_str(&data).map_err(|e| QueueError::Deserialization(e.to_string()))
    }

    /// Number of jobs waiting in the ready collection.
    pub async fn pending_count(&self) -> QueueResult<usize> {
        self.store.zcard(&self.config.queue_key()).await
    }

    /// Rewrite a job snapshot with the current retention.
    pub(crate) async fn save_snapshot(&self, job: &Job) -> QueueResult<()> {
        let data = encode(job)?;
        self.store
            .set_ex(&self.config.job_key(&job.id), &data, self.config.result_ttl)
            .await
    }

    /// Write a job result with the current retention.
    pub(crate) async fn store_result(&self, result: &JobResult) -> QueueResult<()> {
        let data = serde_json::to_string(result)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.store
            .set_ex(&self.config.result_key(&result.job_id), &data, self.config.result_ttl)
            .await?;

        debug!(job_id = %result.job_id, status = %result.status, "Job result stored");
        Ok(())
    }

    /// Remove a job result.
    pub(crate) async fn delete_result(&self, job_id: &str) -> QueueResult<bool> {
        self.store.del(&self.config.result_key(job_id)).await
    }
}

fn encode(job: &Job) -> QueueResult<String> {
    serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyTtl, MemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Memory store whose atomic batches always fail.
    struct RejectingBatches(MemoryStore);

    #[async_trait]
    impl QueueStore for RejectingBatches {
        async fn zadd(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
            self.0.zadd(key, member, score).await
        }

        async fn zpopmax(&self, key: &str) -> QueueResult<Option<(String, f64)>> {
            self.0.zpopmax(key).await
        }

        async fn zcard(&self, key: &str) -> QueueResult<usize> {
            self.0.zcard(key).await
        }

        async fn get(&self, key: &str) -> QueueResult<Option<String>> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
            self.0.set(key, value).await
        }

        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
            self.0.set_ex(key, value, ttl).await
        }

        async fn del(&self, key: &str) -> QueueResult<bool> {
            self.0.del(key).await
        }

        async fn keys(&self, pattern: &str) -> QueueResult<Vec<String>> {
            self.0.keys(pattern).await
        }

        async fn ttl(&self, key: &str) -> QueueResult<KeyTtl> {
            self.0.ttl(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> QueueResult<bool> {
            self.0.expire(key, ttl).await
        }

        async fn exec_atomic(&self, _ops: Vec<StoreOp>) -> QueueResult<()> {
            Err(QueueError::Store("EXECABORT Transaction discarded".into()))
        }
    }

    fn producer() -> (Producer, MemoryStore) {
        let store = MemoryStore::new();
        let producer = Producer::new(Arc::new(store.clone()), QueueConfig::new("test"));
        (producer, store)
    }

    #[tokio::test]
    async fn test_enqueue_assigns_defaults_and_snapshot() {
        let (producer, store) = producer();
        let id = producer.enqueue(Job::new("echo")).await.unwrap();

        let job = producer.get_job(&id).await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.max_retries, Some(3));
        assert!(job.created_at.is_some());
        assert_eq!(store.zcard("test:queue").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_keeps_explicit_id() {
        let (producer, _) = producer();
        let id = producer.enqueue(Job::new("echo").with_id("1")).await.unwrap();
        assert_eq!(id, "1");
        assert_eq!(producer.get_job("1").await.unwrap().job_type, "echo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_expires_after_result_ttl() {
        let store = MemoryStore::new();
        let config = QueueConfig::new("test").with_result_ttl(Duration::from_secs(60));
        let producer = Producer::new(Arc::new(store), config);

        let id = producer.enqueue(Job::new("echo")).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let err = producer.get_job(&id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_enqueue_batch() {
        let (producer, store) = producer();
        let ids = producer
            .enqueue_batch(vec![Job::new("a"), Job::new("b").with_id("b-1")])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], "b-1");
        assert_eq!(store.zcard("test:queue").await.unwrap(), 2);
        assert_eq!(producer.get_job(&ids[0]).await.unwrap().job_type, "a");
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let producer = Producer::new(Arc::new(RejectingBatches(store.clone())), QueueConfig::new("test"));

        let err = producer
            .enqueue_batch(vec![Job::new("a").with_id("a-1"), Job::new("b").with_id("b-1")])
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Store(ref msg) if msg.contains("batch enqueue failed")));
        assert_eq!(store.zcard("test:queue").await.unwrap(), 0);
        assert!(store.keys("test:job:*").await.unwrap().is_empty());
        assert!(producer.get_job("a-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_enqueue_empty_batch() {
        let (producer, _) = producer();
        assert!(producer.enqueue_batch(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_lookups_are_not_found() {
        let (producer, _) = producer();

        let err = producer.get_job("nope").await.unwrap_err();
        assert!(matches!(err, QueueError::JobNotFound(ref id) if id == "nope"));

        let err = producer.get_job_result("nope").await.unwrap_err();
        assert!(matches!(err, QueueError::ResultNotFound(_)));
    }

    #[tokio::test]
    async fn test_store_and_read_result() {
        let (producer, _) = producer();
        let mut result = JobResult::empty();
        result.job_id = "r1".into();
        producer.store_result(&result).await.unwrap();

        let stored = producer.get_job_result("r1").await.unwrap();
        assert_eq!(stored.job_id, "r1");
        assert!(producer.delete_result("r1").await.unwrap());
    }
}
