//! Failure handling: delayed retries and terminal failures.

use membank_log::{debug, error, info, warn};
use crate::job::{Job, JobId, JobResult};
use crate::producer::Producer;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Delay before the `attempt`-th retry.
///
/// Grows linearly: the first retry waits `retry_delay`, the second twice as
/// long, and so on.
pub fn backoff_delay(retry_delay: Duration, attempt: u32) -> Duration {
    retry_delay.saturating_mul(attempt)
}

/// What happened to a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-enqueue scheduled after `delay`
    Retrying {
        /// Retry count after this failure
        attempt: u32,
        /// Wait before the job becomes claimable again
        delay: Duration,
    },
    /// Retry budget exhausted; a failed result was written
    Failed,
}

struct PendingRetry {
    generation: u64,
    token: CancellationToken,
}

/// Decides between retry and terminal failure, and owns the retry timers.
///
/// Timers run on the pool's task tracker and end early when the pool shuts
/// down, so a stopped pool never re-enqueues anything.
#[derive(Clone)]
pub struct RetryController {
    producer: Producer,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    pending: Arc<Mutex<HashMap<JobId, PendingRetry>>>,
    generation: Arc<AtomicU64>,
}

impl RetryController {
    /// Create a controller whose timers stop on `shutdown`.
    pub fn new(producer: Producer, shutdown: CancellationToken, tracker: TaskTracker) -> Self {
        Self {
            producer,
            shutdown,
            tracker,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a failed attempt and either schedule a retry or fail the job.
    ///
    /// Store errors on this path are logged, not returned: the worker has
    /// nobody to hand them to.
    pub async fn handle_failure(
        &self,
        mut job: Job,
        reason: impl Into<String>,
        cancellation: &CancellationToken,
    ) -> FailureOutcome {
        let reason = reason.into();
        let config = self.producer.config();
        let limit = job.retry_limit(config.max_retries);

        if job.retries < limit {
            job.retries += 1;
            job.error = Some(reason.clone());
            let delay = backoff_delay(config.retry_delay, job.retries);

            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                retries = job.retries,
                max_retries = limit,
                delay_ms = delay.as_millis() as u64,
                error = %reason,
                "Job failed, scheduling retry"
            );

            if let Err(e) = self.producer.save_snapshot(&job).await {
                error!(job_id = %job.id, error = %e, "Failed to update job snapshot");
            }

            let attempt = job.retries;
            self.schedule(job, delay, cancellation.clone());
            return FailureOutcome::Retrying { attempt, delay };
        }

        job.error = Some(reason.clone());
        job.failed_at = Some(Utc::now());

        error!(
            job_id = %job.id,
            job_type = %job.job_type,
            retries = job.retries,
            error = %reason,
            "Job failed permanently"
        );

        if let Err(e) = self.producer.save_snapshot(&job).await {
            error!(job_id = %job.id, error = %e, "Failed to update job snapshot");
        }
        if let Err(e) = self.producer.store_result(&JobResult::failed(&job, reason)).await {
            error!(job_id = %job.id, error = %e, "Failed to store job result");
        }

        FailureOutcome::Failed
    }

    /// Number of retries waiting on their timer.
    pub fn pending_retries(&self) -> usize {
        self.pending.lock().len()
    }

    /// Abandon a scheduled retry. Returns false if none was pending.
    pub fn cancel_retry(&self, job_id: &str) -> bool {
        match self.pending.lock().remove(job_id) {
            Some(retry) => {
                retry.token.cancel();
                debug!(job_id = %job_id, "Scheduled retry cancelled");
                true
            }
            None => false,
        }
    }

    fn schedule(&self, job: Job, delay: Duration, cancellation: CancellationToken) {
        let token = self.shutdown.child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let replaced = self.pending.lock().insert(
            job.id.clone(),
            PendingRetry {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.token.cancel();
        }

        let producer = self.producer.clone();
        let pending = self.pending.clone();

        self.tracker.spawn(async move {
            let job_id = job.id.clone();

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(job_id = %job_id, "Scheduled retry abandoned");
                }
                _ = cancellation.cancelled() => {
                    info!(job_id = %job_id, "Retry abandoned, context cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    match producer.enqueue(job).await {
                        Ok(_) => debug!(job_id = %job_id, "Job re-enqueued for retry"),
                        Err(e) => error!(job_id = %job_id, error = %e, "Failed to re-enqueue job"),
                    }
                }
            }

            let mut pending = pending.lock();
            if pending.get(&job_id).is_some_and(|p| p.generation == generation) {
                pending.remove(&job_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::job::JobStatus;
    use crate::store::MemoryStore;

    fn controller(config: QueueConfig) -> (RetryController, Producer, CancellationToken, TaskTracker) {
        let producer = Producer::new(Arc::new(MemoryStore::new()), config);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let retry = RetryController::new(producer.clone(), shutdown.clone(), tracker.clone());
        (retry, producer, shutdown, tracker)
    }

    fn config() -> QueueConfig {
        QueueConfig::new("test")
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(10))
    }

    #[test]
    fn test_backoff_is_linear() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(20));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_schedules_retry() {
        let (retry, producer, _, _) = controller(config());
        let job = Job::new("echo").with_id("j1").with_max_retries(2);

        let outcome = retry.handle_failure(job, "boom", &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            FailureOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(retry.pending_retries(), 1);

        let snapshot = producer.get_job("j1").await.unwrap();
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert_eq!(producer.pending_count().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(11)).await;
        assert_eq!(producer.pending_count().await.unwrap(), 1);
        assert_eq!(retry.pending_retries(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_job() {
        let (retry, producer, _, _) = controller(config());
        let mut job = Job::new("echo").with_id("j2").with_max_retries(2);
        job.retries = 2;

        let outcome = retry.handle_failure(job, "still broken", &CancellationToken::new()).await;
        assert_eq!(outcome, FailureOutcome::Failed);
        assert_eq!(retry.pending_retries(), 0);

        let result = producer.get_job_result("j2").await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.retries, 2);
        assert_eq!(result.error.as_deref(), Some("still broken"));

        let snapshot = producer.get_job("j2").await.unwrap();
        assert!(snapshot.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_zero_retries_fails_immediately() {
        let (retry, producer, _, _) = controller(config());
        let job = Job::new("echo").with_id("j3").with_max_retries(0);

        let outcome = retry.handle_failure(job, "nope", &CancellationToken::new()).await;
        assert_eq!(outcome, FailureOutcome::Failed);
        assert_eq!(producer.get_job_result("j3").await.unwrap().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_pending_retry() {
        let (retry, producer, shutdown, tracker) = controller(config());
        let job = Job::new("echo").with_id("j4");
        retry.handle_failure(job, "boom", &CancellationToken::new()).await;

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;

        assert_eq!(producer.pending_count().await.unwrap(), 0);
        assert_eq!(retry.pending_retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_cancellation_abandons_pending_retry() {
        let (retry, producer, _, tracker) = controller(config());
        let outer = CancellationToken::new();
        retry.handle_failure(Job::new("echo").with_id("j5"), "boom", &outer).await;

        outer.cancel();
        tracker.close();
        tracker.wait().await;

        assert_eq!(producer.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_retry() {
        let (retry, producer, _, _) = controller(config());
        retry
            .handle_failure(Job::new("echo").with_id("j6"), "boom", &CancellationToken::new())
            .await;

        assert!(retry.cancel_retry("j6"));
        assert!(!retry.cancel_retry("j6"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(producer.pending_count().await.unwrap(), 0);
    }
}
