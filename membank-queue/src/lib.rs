//! Asynchronous priority job queue.
//!
//! Jobs live in a shared store (Redis in production, memory for tests) and are
//! claimed atomically by a pool of workers:
//!
//! - ⭐ Integer priorities, FIFO within a priority
//! - 🔄 Bounded retries with linear backoff
//! - ⏱️ Per-job timeouts
//! - 📦 Job snapshots and results with a retention TTL
//! - 👷 Fixed-size worker pools with graceful shutdown
//! - 📊 Queue statistics and failed-job administration
//!
//! ## Quick Start
//!
//! ```
//! use membank_queue::{Job, JobQueue, JobResult, QueueConfig};
//! use membank_queue::store::MemoryStore;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> membank_queue::QueueResult<()> {
//! let config = QueueConfig::new("docs").with_poll_interval(Duration::from_millis(10));
//! let queue = JobQueue::with_store(MemoryStore::new(), config);
//!
//! queue.register_fn("echo", |job, _ctx| async move {
//!     Ok(JobResult::with_result(job.payload))
//! });
//! queue.start_consuming(CancellationToken::new(), 1)?;
//!
//! let id = queue.enqueue(Job::new("echo").with_field("msg", "hello")).await?;
//!
//! let result = loop {
//!     match queue.get_job_result(&id).await {
//!         Ok(result) => break result,
//!         Err(e) if e.is_not_found() => tokio::time::sleep(Duration::from_millis(10)).await,
//!         Err(e) => return Err(e),
//!     }
//! };
//! assert_eq!(result.result.unwrap()["msg"], "hello");
//!
//! queue.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Priorities
//!
//! ```
//! use membank_queue::Job;
//!
//! let urgent = Job::new("generate_embedding").with_priority(10);
//! let background = Job::new("batch_embedding").with_priority(1);
//!
//! assert!(urgent.priority > background.priority);
//! ```
//!
//! ## Custom Handlers
//!
//! ```
//! use async_trait::async_trait;
//! use membank_queue::{HandlerResult, Job, JobContext, JobHandler, JobResult};
//!
//! struct Cleanup;
//!
//! #[async_trait]
//! impl JobHandler for Cleanup {
//!     async fn handle(&self, _ctx: &JobContext, _job: &Job) -> HandlerResult {
//!         Ok(JobResult::empty())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "cleanup_handler"
//!     }
//!
//!     fn job_type(&self) -> &str {
//!         "cleanup"
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod monitor;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod store;
pub mod worker;

pub use config::QueueConfig;
pub use error::{HandlerError, QueueError, QueueResult};
pub use handler::{FnHandler, HandlerRegistry, HandlerResult, JobContext, JobHandler};
pub use job::{Job, JobId, JobResult, JobStatus, MAX_PRIORITY, MIN_PRIORITY, Payload};
pub use monitor::{Monitor, Stats};
pub use producer::{Producer, SharedStore};
pub use queue::JobQueue;
pub use retry::{FailureOutcome, RetryController, backoff_delay};
pub use store::{MemoryStore, QueueStore, RedisStore};
pub use worker::WorkerPool;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{HandlerError, QueueError, QueueResult};
    pub use crate::handler::{FnHandler, HandlerResult, JobContext, JobHandler};
    pub use crate::job::{Job, JobId, JobResult, JobStatus, Payload};
    pub use crate::monitor::Stats;
    pub use crate::queue::JobQueue;
    pub use crate::store::{MemoryStore, QueueStore};
}
