//! Queue inspection, result housekeeping and failed-job administration.

use membank_log::{debug, error, info, warn};
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobResult, JobStatus};
use crate::producer::Producer;
use crate::retry::RetryController;
use crate::store::KeyTtl;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Point-in-time queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Jobs waiting in the priority collection
    pub pending_jobs: usize,
    /// Jobs currently inside a handler
    pub processing_jobs: usize,
    /// Jobs waiting on a retry timer
    pub retrying_jobs: usize,
    /// Stored completed results
    pub completed_jobs: usize,
    /// Stored failed results
    pub failed_jobs: usize,
    /// Sum of the above
    pub total_jobs: usize,
}

/// Reads queue state and maintains stored results.
#[derive(Clone)]
pub struct Monitor {
    producer: Producer,
    retry: RetryController,
    in_flight: Arc<AtomicUsize>,
}

impl Monitor {
    pub(crate) fn new(producer: Producer, retry: RetryController, in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            producer,
            retry,
            in_flight,
        }
    }

    /// Collect current queue statistics.
    ///
    /// Completed and failed counts come from stored results, so they only
    /// cover results still within their retention.
    pub async fn get_stats(&self) -> QueueResult<Stats> {
        let mut stats = Stats {
            pending_jobs: self.producer.pending_count().await?,
            processing_jobs: self.in_flight.load(Ordering::Relaxed),
            retrying_jobs: self.retry.pending_retries(),
            ..Stats::default()
        };

        for result in self.stored_results().await? {
            match result.status {
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
                _ => {}
            }
        }

        stats.total_jobs = stats.pending_jobs
            + stats.processing_jobs
            + stats.retrying_jobs
            + stats.completed_jobs
            + stats.failed_jobs;
        Ok(stats)
    }

    /// List permanently failed jobs, most recent failure first.
    ///
    /// Failures whose snapshot has already expired are skipped.
    pub async fn get_failed_jobs(&self, limit: usize, offset: usize) -> QueueResult<Vec<Job>> {
        let mut failed: Vec<JobResult> = self
            .stored_results()
            .await?
            .into_iter()
            .filter(|result| result.status == JobStatus::Failed)
            .collect();
        failed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.job_id.cmp(&b.job_id)));

        let mut jobs = Vec::new();
        for result in failed.into_iter().skip(offset).take(limit) {
            match self.producer.get_job(&result.job_id).await {
                Ok(job) => jobs.push(job),
                Err(e) if e.is_not_found() => {
                    debug!(job_id = %result.job_id, "Failed job snapshot expired");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    /// Put a permanently failed job back in the queue with a fresh retry budget.
    ///
    /// The job keeps its priority and creation time.
    pub async fn retry_failed_job(&self, job_id: &str) -> QueueResult<()> {
        let result = self.producer.get_job_result(job_id).await?;
        if result.status != JobStatus::Failed {
            return Err(QueueError::NotRetryable(job_id.to_string()));
        }

        let mut job = self.producer.get_job(job_id).await?;
        job.retries = 0;
        job.error = None;
        job.failed_at = None;
        job.processed_at = None;

        self.producer.delete_result(job_id).await?;
        self.producer.enqueue(job).await?;

        info!(job_id = %job_id, "Failed job re-enqueued");
        Ok(())
    }

    /// Delete completed results (and their snapshots) older than `older_than`.
    ///
    /// Returns how many jobs were purged.
    pub async fn purge_completed_jobs(&self, older_than: Duration) -> QueueResult<usize> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| QueueError::Config(format!("invalid purge age: {}", e)))?;
        let cutoff = Utc::now() - age;
        let config = self.producer.config();
        let store = self.producer.store();

        let mut purged = 0;
        for result in self.stored_results().await? {
            if result.status != JobStatus::Completed || result.created_at >= cutoff {
                continue;
            }
            store.del(&config.result_key(&result.job_id)).await?;
            store.del(&config.job_key(&result.job_id)).await?;
            purged += 1;
        }

        if purged > 0 {
            info!(count = purged, "Purged completed jobs");
        }
        Ok(purged)
    }

    /// Give every result key without an expiry the configured retention.
    ///
    /// Results are never deleted here. Returns how many keys were updated.
    pub async fn perform_cleanup(&self) -> QueueResult<usize> {
        let config = self.producer.config();
        let store = self.producer.store();
        let keys = store.keys(&config.result_pattern()).await?;

        let mut cleaned = 0;
        for key in keys {
            match store.ttl(&key).await {
                Ok(KeyTtl::Persistent) => match store.expire(&key, config.result_ttl).await {
                    Ok(true) => cleaned += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %key, error = %e, "Failed to set TTL for result key"),
                },
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to read TTL for result key"),
            }
        }

        if cleaned > 0 {
            info!(count = cleaned, "Cleaned up job results");
        }
        Ok(cleaned)
    }

    /// Run cleanup every `cleanup_interval` until either token fires.
    pub(crate) async fn run_cleanup(&self, shutdown: CancellationToken, cancellation: CancellationToken) {
        let period = self.producer.config().cleanup_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.perform_cleanup().await {
                        error!(error = %e, "Failed to get result keys for cleanup");
                    }
                }
            }
        }
        debug!("Cleanup loop stopped");
    }

    /// Log queue statistics every `stats_interval` until either token fires.
    pub(crate) async fn run_stats(&self, shutdown: CancellationToken, cancellation: CancellationToken) {
        let period = self.producer.config().stats_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => match self.get_stats().await {
                    Ok(stats) => info!(
                        pending = stats.pending_jobs,
                        processing = stats.processing_jobs,
                        retrying = stats.retrying_jobs,
                        completed = stats.completed_jobs,
                        failed = stats.failed_jobs,
                        total = stats.total_jobs,
                        "Queue stats"
                    ),
                    Err(e) => warn!(error = %e, "Failed to collect queue stats"),
                },
            }
        }
        debug!("Stats loop stopped");
    }

    async fn stored_results(&self) -> QueueResult<Vec<JobResult>> {
        let store = self.producer.store();
        let keys = store.keys(&self.producer.config().result_pattern()).await?;

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(data) = store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<JobResult>(&data) {
                Ok(result) => results.push(result),
                Err(e) => debug!(key = %key, error = %e, "Skipping undecodable job result"),
            }
        }
        Ok(results)
    }
}
