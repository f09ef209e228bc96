//! Typed views of embedding job payloads.

use crate::error::{JobError, Result};
use membank_queue::{Job, Payload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Memories embedded per batch job when the payload gives no limit.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Payload of a `generate_embedding` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateEmbeddingPayload {
    pub memory_id: Uuid,
}

/// Payload of a `batch_embedding` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEmbeddingPayload {
    pub user_id: Uuid,
    /// Any JSON number is accepted and truncated toward zero. Values that are
    /// not positive numbers fall back to [`DEFAULT_BATCH_LIMIT`].
    #[serde(default = "default_limit", deserialize_with = "lenient_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn lenient_limit<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let limit = match value.as_u64() {
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        None => match value.as_f64() {
            // `as` saturates, and NaN maps to zero
            Some(f) if f >= 1.0 => f.trunc() as usize,
            _ => 0,
        },
    };
    Ok(if limit == 0 { DEFAULT_BATCH_LIMIT } else { limit })
}

impl GenerateEmbeddingPayload {
    /// Read the payload of `job`.
    pub fn from_job(job: &Job) -> Result<Self> {
        decode(&job.payload)
    }

    /// Encode into a job payload.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("memory_id".into(), self.memory_id.to_string().into());
        payload
    }
}

impl BatchEmbeddingPayload {
    /// Read the payload of `job`. A missing, zero, negative or non-numeric
    /// limit falls back to the default.
    pub fn from_job(job: &Job) -> Result<Self> {
        decode(&job.payload)
    }

    /// Encode into a job payload.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("user_id".into(), self.user_id.to_string().into());
        payload.insert("limit".into(), self.limit.into());
        payload
    }
}

fn decode<T: DeserializeOwned>(payload: &Payload) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(payload.clone()))
        .map_err(|e| JobError::InvalidPayload(e.to_string()))
}
