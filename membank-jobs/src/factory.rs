// Constructors for the embedding job types

use crate::payloads::{BatchEmbeddingPayload, GenerateEmbeddingPayload};
use chrono::Utc;
use membank_queue::Job;
use uuid::Uuid;

/// Job type that embeds a single memory.
pub const JOB_TYPE_GENERATE_EMBEDDING: &str = "generate_embedding";

/// Job type reserved for memory updates. No handler ships for it.
pub const JOB_TYPE_UPDATE_MEMORY: &str = "update_memory";

/// Job type that embeds a user's memories that lack an embedding.
pub const JOB_TYPE_BATCH_EMBEDDING: &str = "batch_embedding";

/// Builds jobs for the embedding handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFactory;

impl JobFactory {
    pub fn new() -> Self {
        Self
    }

    /// Job that embeds one memory.
    pub fn generate_embedding(&self, memory_id: Uuid, priority: i32) -> Job {
        Job::new(JOB_TYPE_GENERATE_EMBEDDING)
            .with_priority(priority)
            .with_payload(GenerateEmbeddingPayload { memory_id }.to_payload())
            .with_created_at(Utc::now())
    }

    /// Job that embeds up to `limit` of a user's memories.
    pub fn batch_embedding(&self, user_id: Uuid, limit: usize, priority: i32) -> Job {
        Job::new(JOB_TYPE_BATCH_EMBEDDING)
            .with_priority(priority)
            .with_payload(BatchEmbeddingPayload { user_id, limit }.to_payload())
            .with_created_at(Utc::now())
    }
}
