//! Worker pool for processing jobs.

use membank_log::{debug, error, info, warn};
use crate::error::{QueueError, QueueResult};
use crate::handler::{FnHandler, HandlerRegistry, HandlerResult, JobContext, JobHandler};
use crate::job::{Job, JobResult, JobStatus};
use crate::monitor::Monitor;
use crate::producer::Producer;
use crate::retry::RetryController;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Stopped,
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Poll {
    /// A member was claimed and dealt with
    Processed,
    /// Nothing was ready
    Empty,
    /// The store could not be reached
    Unavailable,
}

/// Fixed-size pool of workers consuming the priority collection.
///
/// A pool is started at most once. Stopping waits for in-flight handlers,
/// the housekeeping loops and any retry timers to finish.
pub struct WorkerPool {
    dispatcher: Dispatcher,
    monitor: Monitor,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Create an idle pool consuming through `producer`.
    pub fn new(producer: Producer) -> Self {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let retry = RetryController::new(producer.clone(), shutdown.clone(), tracker.clone());
        let monitor = Monitor::new(producer.clone(), retry.clone(), in_flight.clone());

        Self {
            dispatcher: Dispatcher {
                producer,
                registry: HandlerRegistry::new(),
                retry,
                in_flight,
            },
            monitor,
            shutdown,
            tracker,
            state: Mutex::new(PoolState::Idle),
        }
    }

    /// Register a handler for a job type.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.dispatcher.registry.register(job_type, handler);
    }

    /// Register an async closure as the handler for a job type.
    ///
    /// # Examples
    ///
    /// ```
    /// use membank_queue::{JobResult, Producer, WorkerPool};
    /// use membank_queue::store::MemoryStore;
    /// use std::sync::Arc;
    ///
    /// let producer = Producer::new(Arc::new(MemoryStore::new()), Default::default());
    /// let pool = WorkerPool::new(producer);
    ///
    /// pool.register_fn("echo", |job, _ctx| async move {
    ///     Ok(JobResult::with_result(job.payload))
    /// });
    /// assert_eq!(pool.registry().job_types(), vec!["echo".to_string()]);
    /// ```
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, function: F)
    where
        F: Fn(Job, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let job_type = job_type.into();
        let handler = FnHandler::new(job_type.clone(), function);
        self.register_handler(job_type, Arc::new(handler));
    }

    /// Handler registry shared by the workers.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.dispatcher.registry
    }

    /// Monitor over this pool's queue.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Retry controller owning this pool's retry timers.
    pub fn retry_controller(&self) -> &RetryController {
        &self.dispatcher.retry
    }

    /// Jobs currently inside a handler.
    pub fn processing_count(&self) -> usize {
        self.dispatcher.in_flight.load(Ordering::Relaxed)
    }

    /// Check whether workers are running.
    pub fn is_running(&self) -> bool {
        *self.state.lock() == PoolState::Running
    }

    /// Start `concurrency` workers plus the housekeeping loops.
    ///
    /// Returns immediately. A `concurrency` of zero uses the configured
    /// default. Workers also stop when `cancellation` fires; handlers see it
    /// through their [`JobContext`].
    pub fn start_consuming(&self, cancellation: CancellationToken, concurrency: usize) -> QueueResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                PoolState::Running => return Err(QueueError::WorkerAlreadyRunning),
                PoolState::Stopped => return Err(QueueError::WorkerStopped),
                PoolState::Idle => *state = PoolState::Running,
            }
        }

        let config = self.dispatcher.producer.config();
        let concurrency = if concurrency == 0 {
            config.default_concurrency
        } else {
            concurrency
        };

        info!(
            queue = %config.queue_name,
            concurrency,
            "Starting job consumer"
        );

        for worker_id in 0..concurrency {
            let dispatcher = self.dispatcher.clone();
            let shutdown = self.shutdown.clone();
            let cancellation = cancellation.clone();
            self.tracker
                .spawn(async move { dispatcher.run(worker_id, shutdown, cancellation).await });
        }

        let monitor = self.monitor.clone();
        let shutdown = self.shutdown.clone();
        let outer = cancellation.clone();
        self.tracker
            .spawn(async move { monitor.run_cleanup(shutdown, outer).await });

        if config.stats_enabled {
            let monitor = self.monitor.clone();
            let shutdown = self.shutdown.clone();
            self.tracker
                .spawn(async move { monitor.run_stats(shutdown, cancellation).await });
        }

        Ok(())
    }

    /// Signal shutdown and wait for every worker and timer to exit.
    ///
    /// In-flight handlers run to completion (bounded by the job timeout).
    /// Safe to call more than once, and before the pool was started.
    pub async fn stop_consuming(&self) -> QueueResult<()> {
        let previous = std::mem::replace(&mut *self.state.lock(), PoolState::Stopped);
        if previous == PoolState::Running {
            info!("Stopping job consumer");
        }

        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if previous == PoolState::Running {
            info!("Job consumer stopped");
        }
        Ok(())
    }

    /// Poll once on behalf of `worker_id`, outside the worker loop.
    #[cfg(test)]
    pub(crate) async fn process_next_job(&self, worker_id: usize, cancellation: &CancellationToken) -> Poll {
        self.dispatcher.process_next_job(worker_id, cancellation).await
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Everything a worker task needs, cheap to clone into each task.
#[derive(Clone)]
struct Dispatcher {
    producer: Producer,
    registry: HandlerRegistry,
    retry: RetryController,
    in_flight: Arc<AtomicUsize>,
}

/// Keeps the processing counter accurate even if a handler panics.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Dispatcher {
    async fn run(&self, worker_id: usize, shutdown: CancellationToken, cancellation: CancellationToken) {
        debug!(worker_id, "Worker started");

        let mut ticker = interval(self.producer.config().poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'outer: loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(worker_id, "Worker stopped");
                    break;
                }
                _ = cancellation.cancelled() => {
                    debug!(worker_id, "Worker stopped due to context cancellation");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // Drain while work is available; wait for the next tick otherwise.
            loop {
                if shutdown.is_cancelled() || cancellation.is_cancelled() {
                    continue 'outer;
                }
                match self.process_next_job(worker_id, &cancellation).await {
                    Poll::Processed => {}
                    Poll::Empty | Poll::Unavailable => break,
                }
            }
        }
    }

    async fn process_next_job(&self, worker_id: usize, cancellation: &CancellationToken) -> Poll {
        let config = self.producer.config();

        let member = match self.producer.store().zpopmax(&config.queue_key()).await {
            Ok(Some((member, _))) => member,
            Ok(None) => return Poll::Empty,
            Err(e) => {
                error!(worker_id, error = %e, "Failed to pop job from queue");
                return Poll::Unavailable;
            }
        };

        let job: Job = match serde_json::from_str(&member) {
            Ok(job) => job,
            Err(e) => {
                self.reject_undecodable(worker_id, &member, e).await;
                return Poll::Processed;
            }
        };

        let _guard = InFlight::enter(&self.in_flight);
        let started = Instant::now();

        info!(
            worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            retries = job.retries,
            "Processing job"
        );

        let Some(handler) = self.registry.get(&job.job_type) else {
            let err = QueueError::NoHandler(job.job_type.clone());
            error!(worker_id, job_id = %job.id, error = %err, "No handler for job type");
            self.retry.handle_failure(job, err.to_string(), cancellation).await;
            return Poll::Processed;
        };

        let ctx = JobContext::new(worker_id, config.job_timeout, cancellation.clone());
        let handled = AssertUnwindSafe(handler.handle(&ctx, &job)).catch_unwind();
        let outcome = tokio::time::timeout(config.job_timeout, handled).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(Ok(result))) => self.complete(worker_id, job, result, elapsed).await,
            Ok(Ok(Err(e))) => {
                error!(
                    worker_id,
                    job_id = %job.id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Job failed"
                );
                self.retry.handle_failure(job, e.to_string(), cancellation).await;
            }
            Ok(Err(panic)) => {
                let err = QueueError::Handler(format!("handler panicked: {}", panic_message(&*panic)));
                error!(
                    worker_id,
                    job_id = %job.id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "Job handler panicked"
                );
                self.retry.handle_failure(job, err.to_string(), cancellation).await;
            }
            Err(_) => {
                let err = QueueError::Timeout(config.job_timeout);
                error!(worker_id, job_id = %job.id, error = %err, "Job timed out");
                self.retry.handle_failure(job, err.to_string(), cancellation).await;
            }
        }

        Poll::Processed
    }

    async fn complete(&self, worker_id: usize, mut job: Job, mut result: JobResult, elapsed: Duration) {
        result.job_id = job.id.clone();
        result.status = JobStatus::Completed;
        result.error = None;
        result.duration = elapsed;
        result.retries = job.retries;
        result.created_at = Utc::now();

        if let Err(e) = self.producer.store_result(&result).await {
            error!(worker_id, job_id = %job.id, error = %e, "Failed to store job result");
        }

        job.processed_at = Some(result.created_at);
        if let Err(e) = self.producer.save_snapshot(&job).await {
            warn!(worker_id, job_id = %job.id, error = %e, "Failed to update job snapshot");
        }

        info!(
            worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            duration_ms = elapsed.as_millis() as u64,
            "Job completed successfully"
        );
    }

    /// A member that is not a job cannot be retried. Record a failure if the
    /// id is recoverable, otherwise drop it.
    async fn reject_undecodable(&self, worker_id: usize, member: &str, err: serde_json::Error) {
        let reason = QueueError::Deserialization(err.to_string()).to_string();
        let id = serde_json::from_str::<serde_json::Value>(member)
            .ok()
            .and_then(|value| value.get("id").and_then(|id| id.as_str()).map(str::to_owned))
            .filter(|id| !id.is_empty());

        let Some(id) = id else {
            error!(worker_id, error = %reason, "Dropping undecodable queue member");
            return;
        };

        error!(worker_id, job_id = %id, error = %reason, "Failed to decode job");
        let mut job = Job::new("").with_id(id);
        job.failed_at = Some(Utc::now());
        if let Err(e) = self.producer.store_result(&JobResult::failed(&job, reason)).await {
            error!(worker_id, job_id = %job.id, error = %e, "Failed to store job result");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}
