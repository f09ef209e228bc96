//! Error types for embedding jobs.

use membank_queue::HandlerError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for embedding jobs.
pub type Result<T> = std::result::Result<T, JobError>;

/// Embedding job errors.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Memory not found: {0}")]
    MemoryNotFound(Uuid),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Embedding error: {0}")]
    Embedding(String),
}

impl From<JobError> for HandlerError {
    fn from(err: JobError) -> Self {
        HandlerError::from_error(err)
    }
}
