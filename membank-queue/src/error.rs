//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The shared store rejected a command or could not be reached
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Job snapshot not found (absent or expired)
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job result not found (not yet resolved, or expired)
    #[error("Job result not found: {0}")]
    ResultNotFound(String),

    /// No handler registered for job type
    #[error("No handler registered for job type: {0}")]
    NoHandler(String),

    /// Job execution exceeded the configured timeout
    #[error("Job execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Handler panicked instead of returning a result
    #[error("Job execution failed: {0}")]
    Handler(String),

    /// Job is not in a state that allows the operation
    #[error("Job {0} is not in a retryable state")]
    NotRetryable(String),

    /// Worker pool already running
    #[error("Worker pool already running")]
    WorkerAlreadyRunning,

    /// Worker pool was stopped and cannot be restarted
    #[error("Worker pool has been stopped")]
    WorkerStopped,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Check if this error means the requested key is absent or expired.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_) | Self::ResultNotFound(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Error returned by a job handler.
///
/// Handlers own their failure vocabulary; the queue only needs the message,
/// which ends up in the job's `error` field and the terminal result.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wrap any error, keeping its display text.
    pub fn from_error(err: impl std::error::Error) -> Self {
        Self::new(err.to_string())
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}
