//! Embedding jobs for mem_bank.
//!
//! Job constructors, typed payloads and the handlers that turn memories into
//! vectors. Handlers are generic over an [`EmbeddingService`] and a
//! [`MemoryRepository`], so any storage or provider can be plugged in.
//!
//! ```no_run
//! use membank_jobs::{EmbeddingService, JobFactory, MemoryRepository, register_embedding_handlers};
//! use membank_queue::JobQueue;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn wire(
//! #     queue: JobQueue,
//! #     embeddings: Arc<dyn EmbeddingService>,
//! #     memories: Arc<dyn MemoryRepository>,
//! # ) -> membank_queue::QueueResult<()> {
//! register_embedding_handlers(queue.pool().registry(), embeddings, memories);
//!
//! let job = JobFactory::new().generate_embedding(Uuid::new_v4(), 10);
//! queue.enqueue(job).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod factory;
pub mod handlers;
pub mod payloads;
pub mod service;

pub use error::{JobError, Result};
pub use factory::{JOB_TYPE_BATCH_EMBEDDING, JOB_TYPE_GENERATE_EMBEDDING, JOB_TYPE_UPDATE_MEMORY, JobFactory};
pub use handlers::{BatchEmbeddingHandler, GenerateEmbeddingHandler, register_embedding_handlers};
pub use payloads::{BatchEmbeddingPayload, DEFAULT_BATCH_LIMIT, GenerateEmbeddingPayload};
pub use service::{BatchEmbedding, Embedding, EmbeddingService, Memory, MemoryRepository, TokenUsage};
