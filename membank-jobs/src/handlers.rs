//! Queue handlers for the embedding job types.

use membank_log::{error, info};
use crate::factory::{JOB_TYPE_BATCH_EMBEDDING, JOB_TYPE_GENERATE_EMBEDDING};
use crate::payloads::{BatchEmbeddingPayload, GenerateEmbeddingPayload};
use crate::service::{EmbeddingService, Memory, MemoryRepository};
use async_trait::async_trait;
use membank_queue::{HandlerRegistry, HandlerResult, Job, JobContext, JobHandler, JobResult, Payload};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Embeds a single memory and saves the vector on it.
pub struct GenerateEmbeddingHandler<E: ?Sized, R: ?Sized> {
    embeddings: Arc<E>,
    memories: Arc<R>,
}

impl<E: ?Sized, R: ?Sized> GenerateEmbeddingHandler<E, R> {
    pub fn new(embeddings: Arc<E>, memories: Arc<R>) -> Self {
        Self {
            embeddings,
            memories,
        }
    }
}

#[async_trait]
impl<E, R> JobHandler for GenerateEmbeddingHandler<E, R>
where
    E: EmbeddingService + ?Sized + 'static,
    R: MemoryRepository + ?Sized + 'static,
{
    async fn handle(&self, _ctx: &JobContext, job: &Job) -> HandlerResult {
        let GenerateEmbeddingPayload { memory_id } = GenerateEmbeddingPayload::from_job(job)?;

        let mut memory = self.memories.find_by_id(memory_id).await?;
        let embedding = self.embeddings.generate_embedding(&memory.content).await?;
        let dimensions = embedding.embedding.len();

        memory.update_embedding(embedding.embedding);
        self.memories.update(&memory).await?;

        info!(
            memory_id = %memory.id,
            embedding_dim = dimensions,
            model = %embedding.model,
            cached = embedding.cached,
            "Memory embedding generated and updated"
        );

        Ok(JobResult::with_result(into_payload(json!({
            "memory_id": memory.id.to_string(),
            "embedding_dim": dimensions,
            "model": embedding.model,
            "cached": embedding.cached,
        }))))
    }

    fn name(&self) -> &str {
        "GenerateEmbeddingHandler"
    }

    fn job_type(&self) -> &str {
        JOB_TYPE_GENERATE_EMBEDDING
    }
}

/// Embeds a user's memories that do not have an embedding yet.
///
/// A failed update is logged and skipped; the job still succeeds and reports
/// how many memories were actually updated.
pub struct BatchEmbeddingHandler<E: ?Sized, R: ?Sized> {
    embeddings: Arc<E>,
    memories: Arc<R>,
}

impl<E: ?Sized, R: ?Sized> BatchEmbeddingHandler<E, R> {
    pub fn new(embeddings: Arc<E>, memories: Arc<R>) -> Self {
        Self {
            embeddings,
            memories,
        }
    }
}

impl<E, R> BatchEmbeddingHandler<E, R>
where
    E: EmbeddingService + ?Sized,
    R: MemoryRepository + ?Sized,
{
    // Over-fetch, then keep only memories without an embedding.
    async fn memories_without_embeddings(&self, user_id: Uuid, limit: usize) -> crate::Result<Vec<Memory>> {
        let candidates = self
            .memories
            .find_by_user_id(user_id, limit.saturating_mul(2), 0)
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|memory| !memory.has_embedding())
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl<E, R> JobHandler for BatchEmbeddingHandler<E, R>
where
    E: EmbeddingService + ?Sized + 'static,
    R: MemoryRepository + ?Sized + 'static,
{
    async fn handle(&self, _ctx: &JobContext, job: &Job) -> HandlerResult {
        let BatchEmbeddingPayload { user_id, limit } = BatchEmbeddingPayload::from_job(job)?;

        let memories = self.memories_without_embeddings(user_id, limit).await?;
        if memories.is_empty() {
            return Ok(JobResult::with_result(into_payload(json!({
                "processed_count": 0,
                "message": "No memories found without embeddings",
            }))));
        }

        let texts: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
        let batch = self.embeddings.generate_embeddings(&texts).await?;

        let total = memories.len();
        let mut updated = 0usize;
        for (mut memory, embedding) in memories.into_iter().zip(batch.results) {
            memory.update_embedding(embedding.embedding);
            match self.memories.update(&memory).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    error!(memory_id = %memory.id, error = %e, "Failed to update memory with embedding");
                }
            }
        }

        info!(
            user_id = %user_id,
            processed_count = updated,
            total_tokens = batch.usage.total_tokens,
            "Batch embeddings generated and updated"
        );

        Ok(JobResult::with_result(into_payload(json!({
            "user_id": user_id.to_string(),
            "processed_count": updated,
            "total_memories": total,
            "token_usage": batch.usage,
        }))))
    }

    fn name(&self) -> &str {
        "BatchEmbeddingHandler"
    }

    fn job_type(&self) -> &str {
        JOB_TYPE_BATCH_EMBEDDING
    }
}

/// Register both embedding handlers on `registry`.
pub fn register_embedding_handlers<E, R>(registry: &HandlerRegistry, embeddings: Arc<E>, memories: Arc<R>)
where
    E: EmbeddingService + ?Sized + 'static,
    R: MemoryRepository + ?Sized + 'static,
{
    registry.register(
        JOB_TYPE_GENERATE_EMBEDDING,
        Arc::new(GenerateEmbeddingHandler::new(embeddings.clone(), memories.clone())),
    );
    registry.register(
        JOB_TYPE_BATCH_EMBEDDING,
        Arc::new(BatchEmbeddingHandler::new(embeddings, memories)),
    );
}

fn into_payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}
