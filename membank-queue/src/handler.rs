//! Job handlers and the registry that dispatches to them.

use crate::error::HandlerError;
use crate::job::{Job, JobResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of a handler invocation.
pub type HandlerResult = Result<JobResult, HandlerError>;

/// Execution context handed to a handler.
///
/// The queue enforces the deadline itself; handlers that check it (or the
/// cancellation token) can stop early instead of being cut off.
#[derive(Debug, Clone)]
pub struct JobContext {
    worker_id: usize,
    deadline: Instant,
    cancellation: CancellationToken,
}

impl JobContext {
    /// Create a context with the given deadline.
    pub fn new(worker_id: usize, timeout: Duration, cancellation: CancellationToken) -> Self {
        Self {
            worker_id,
            deadline: Instant::now() + timeout,
            cancellation,
        }
    }

    /// Worker executing the job.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Point in time at which the job is considered timed out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the outer context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Wait until the outer context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Processes jobs of one type.
///
/// Jobs may be delivered more than once (a retry after a partial run), so
/// handlers should be safe to re-run.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a job and return its result payload.
    async fn handle(&self, ctx: &JobContext, job: &Job) -> HandlerResult;

    /// Handler name, for logs.
    fn name(&self) -> &str;

    /// Job type this handler processes.
    fn job_type(&self) -> &str;
}

/// Adapts an async closure into a [`JobHandler`].
///
/// # Examples
///
/// ```
/// use membank_queue::{FnHandler, JobHandler, JobResult};
///
/// let handler = FnHandler::new("echo", |_job, _ctx| async move {
///     Ok(JobResult::empty())
/// });
/// assert_eq!(handler.job_type(), "echo");
/// ```
pub struct FnHandler<F> {
    name: String,
    job_type: String,
    function: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Job, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a handler for `job_type`, named after it.
    pub fn new(job_type: impl Into<String>, function: F) -> Self {
        let job_type = job_type.into();
        Self {
            name: format!("{}_handler", job_type),
            job_type,
            function,
        }
    }

    /// Override the handler name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: &JobContext, job: &Job) -> HandlerResult {
        (self.function)(job.clone(), ctx.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn job_type(&self) -> &str {
        &self.job_type
    }
}

/// Maps job types to handlers.
///
/// Guarded by a reader/writer lock; the last registration for a type wins.
/// Registering while workers run is safe, but whether an in-flight dispatch
/// sees the new handler is unspecified.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        membank_log::info!(job_type = %job_type, handler = %handler.name(), "Job handler registered");
        self.handlers.write().insert(job_type, handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(job_type).cloned()
    }

    /// Registered job types.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
