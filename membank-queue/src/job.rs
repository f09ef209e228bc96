//! Job definition and result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job unique identifier.
pub type JobId = String;

/// Opaque job payload. Only handlers interpret it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Weight applied to the priority when computing a queue score.
///
/// Millisecond timestamps stay below 10^13 until the year 2286, so a
/// one-step priority difference always outweighs any timestamp difference.
pub const PRIORITY_WEIGHT: f64 = 1e13;

/// Highest priority that orders distinctly.
///
/// Scores must stay below 2^53 in magnitude to be exact integers in an `f64`,
/// which is what keeps millisecond FIFO order inside a band. With the
/// timestamp term below 10^13 that leaves 899 bands either side of zero.
pub const MAX_PRIORITY: i32 = 899;

/// Lowest priority that orders distinctly. See [`MAX_PRIORITY`].
pub const MIN_PRIORITY: i32 = -MAX_PRIORITY;

/// Compute the sorted-set score for a job.
///
/// The highest score is claimed first: higher priority wins, and within a
/// priority band the older `created_at` wins. Priorities outside
/// [`MIN_PRIORITY`]`..=`[`MAX_PRIORITY`] score as the nearest bound; the job
/// keeps its original priority.
pub fn score(priority: i32, created_at: DateTime<Utc>) -> f64 {
    let priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
    f64::from(priority) * PRIORITY_WEIGHT - created_at.timestamp_millis() as f64
}

/// Job status as recorded on a [`JobResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting in the ready collection
    Pending,
    /// Job has been claimed by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed permanently
    Failed,
    /// Job failed and is waiting for its backoff to elapse
    Retrying,
}

impl JobStatus {
    /// Get the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier; assigned on enqueue when empty
    #[serde(default)]
    pub id: JobId,

    /// Job type, used to select a handler
    #[serde(rename = "type")]
    pub job_type: String,

    /// Job payload data
    #[serde(default)]
    pub payload: Payload,

    /// Higher numbers dispatch first
    #[serde(default)]
    pub priority: i32,

    /// Maximum number of retries; the queue default applies when unset
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Number of failed attempts so far
    #[serde(default)]
    pub retries: u32,

    /// Set once, at first enqueue
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// When the job completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// When the job failed permanently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    /// Last failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a new job of the given type with an empty payload.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            job_type: job_type.into(),
            payload: Payload::new(),
            priority: 0,
            max_retries: None,
            retries: 0,
            created_at: None,
            processed_at: None,
            failed_at: None,
            error: None,
        }
    }

    /// Set an explicit job id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set job priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Add a single payload entry.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Fill in the identity and retry defaults the producer is responsible for.
    ///
    /// Existing values are never overwritten, so a re-enqueued job keeps its
    /// original `created_at`.
    pub fn apply_defaults(&mut self, default_max_retries: u32) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        if self.max_retries.is_none() {
            self.max_retries = Some(default_max_retries);
        }
    }

    /// Queue score for this job. Jobs without a timestamp score as created now.
    pub fn score(&self) -> f64 {
        score(self.priority, self.created_at.unwrap_or_else(Utc::now))
    }

    /// Effective retry bound.
    pub fn retry_limit(&self, default_max_retries: u32) -> u32 {
        self.max_retries.unwrap_or(default_max_retries)
    }

    /// Check if another attempt is allowed.
    pub fn can_retry(&self, default_max_retries: u32) -> bool {
        self.retries < self.retry_limit(default_max_retries)
    }
}

/// Outcome of processing a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job the result belongs to
    #[serde(default)]
    pub job_id: JobId,

    /// Result status
    pub status: JobStatus,

    /// Handler output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,

    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Handler run time
    #[serde(default, with = "duration_millis")]
    pub duration: Duration,

    /// Failed attempts at the time the result was written
    #[serde(default)]
    pub retries: u32,

    /// When the result was written
    pub created_at: DateTime<Utc>,
}

impl JobResult {
    /// Create a result carrying a handler payload.
    ///
    /// The worker fills in the identity, status and timing fields.
    pub fn with_result(result: Payload) -> Self {
        Self {
            result: Some(result),
            ..Self::empty()
        }
    }

    /// Create a result without a payload.
    pub fn empty() -> Self {
        Self {
            job_id: String::new(),
            status: JobStatus::Completed,
            result: None,
            error: None,
            duration: Duration::ZERO,
            retries: 0,
            created_at: Utc::now(),
        }
    }

    /// Build the terminal failure record for a job.
    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            status: JobStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration: Duration::ZERO,
            retries: job.retries,
            created_at: job.failed_at.unwrap_or_else(Utc::now),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
