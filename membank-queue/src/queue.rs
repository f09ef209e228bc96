//! Job queue facade: producer, worker pool and monitor behind one handle.

use membank_log::info;
use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::handler::{HandlerResult, JobContext, JobHandler};
use crate::job::{Job, JobId, JobResult};
use crate::monitor::Stats;
use crate::producer::{Producer, SharedStore};
use crate::store::{QueueStore, RedisStore};
use crate::worker::WorkerPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Priority job queue.
///
/// # Examples
///
/// ```
/// use membank_queue::{Job, JobQueue, JobResult, QueueConfig};
/// use membank_queue::store::MemoryStore;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> membank_queue::QueueResult<()> {
/// let queue = JobQueue::with_store(MemoryStore::new(), QueueConfig::default());
/// queue.register_fn("echo", |job, _ctx| async move {
///     Ok(JobResult::with_result(job.payload))
/// });
///
/// queue.start_consuming(CancellationToken::new(), 2)?;
/// let id = queue.enqueue(Job::new("echo").with_field("msg", "hello")).await?;
/// # let _ = id;
/// queue.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct JobQueue {
    producer: Producer,
    pool: WorkerPool,
}

impl JobQueue {
    /// Connect to Redis and create a queue.
    pub async fn connect(redis_url: &str, config: QueueConfig) -> QueueResult<Self> {
        let store = RedisStore::connect(redis_url).await?;
        let queue = Self::with_store(store, config);

        info!(queue = %queue.config().queue_name, "Job queue ready");
        Ok(queue)
    }

    /// Create a queue over any store.
    pub fn with_store<S: QueueStore>(store: S, config: QueueConfig) -> Self {
        Self::new(Arc::new(store), config)
    }

    /// Create a queue over a shared store handle.
    pub fn new(store: SharedStore, config: QueueConfig) -> Self {
        let producer = Producer::new(store, config);
        let pool = WorkerPool::new(producer.clone());
        Self { producer, pool }
    }

    /// Effective configuration.
    pub fn config(&self) -> &QueueConfig {
        self.producer.config()
    }

    /// Producer handle, cloneable into other components.
    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// Worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Enqueue a job.
    pub async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        self.producer.enqueue(job).await
    }

    /// Enqueue several jobs atomically.
    pub async fn enqueue_batch(&self, jobs: Vec<Job>) -> QueueResult<Vec<JobId>> {
        self.producer.enqueue_batch(jobs).await
    }

    /// Get a job snapshot.
    pub async fn get_job(&self, job_id: &str) -> QueueResult<Job> {
        self.producer.get_job(job_id).await
    }

    /// Get a job result.
    pub async fn get_job_result(&self, job_id: &str) -> QueueResult<JobResult> {
        self.producer.get_job_result(job_id).await
    }

    /// Register a handler for a job type.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.pool.register_handler(job_type, handler);
    }

    /// Register an async closure as the handler for a job type.
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, function: F)
    where
        F: Fn(Job, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.pool.register_fn(job_type, function);
    }

    /// Start consuming. See [`WorkerPool::start_consuming`].
    pub fn start_consuming(&self, cancellation: CancellationToken, concurrency: usize) -> QueueResult<()> {
        self.pool.start_consuming(cancellation, concurrency)
    }

    /// Stop consuming and wait for workers to drain.
    pub async fn stop_consuming(&self) -> QueueResult<()> {
        self.pool.stop_consuming().await
    }

    /// Stop consuming and release the queue.
    pub async fn close(&self) -> QueueResult<()> {
        self.pool.stop_consuming().await?;
        info!(queue = %self.config().queue_name, "Job queue closed");
        Ok(())
    }

    /// Current queue statistics.
    pub async fn get_stats(&self) -> QueueResult<Stats> {
        self.pool.monitor().get_stats().await
    }

    /// Permanently failed jobs, most recent first.
    pub async fn get_failed_jobs(&self, limit: usize, offset: usize) -> QueueResult<Vec<Job>> {
        self.pool.monitor().get_failed_jobs(limit, offset).await
    }

    /// Re-enqueue a permanently failed job.
    pub async fn retry_failed_job(&self, job_id: &str) -> QueueResult<()> {
        self.pool.monitor().retry_failed_job(job_id).await
    }

    /// Remove completed jobs older than `older_than`.
    pub async fn purge_completed_jobs(&self, older_than: Duration) -> QueueResult<usize> {
        self.pool.monitor().purge_completed_jobs(older_than).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_facade_delegates() {
        let queue = JobQueue::with_store(MemoryStore::new(), QueueConfig::new("facade"));
        let id = queue.enqueue(Job::new("echo")).await.unwrap();

        assert_eq!(queue.get_job(&id).await.unwrap().job_type, "echo");
        assert_eq!(queue.get_stats().await.unwrap().pending_jobs, 1);
        assert!(queue.get_failed_jobs(10, 0).await.unwrap().is_empty());
        queue.close().await.unwrap();
    }

    // Requires Redis running: cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_connect_redis() {
        let config = QueueConfig::new("membank_test_facade");
        let queue = JobQueue::connect("redis://localhost:6379", config).await.unwrap();
        let id = queue.enqueue(Job::new("echo")).await.unwrap();
        assert_eq!(queue.get_job(&id).await.unwrap().id, id);
        queue.close().await.unwrap();
    }
}
