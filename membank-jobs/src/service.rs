//! Collaborators the embedding handlers depend on.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The parts of a stored memory the embedding jobs read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Create a memory without an embedding.
    pub fn new(user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content: content.into(),
            embedding: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether an embedding has been generated.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Replace the embedding and bump `updated_at`.
    pub fn update_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = embedding;
        self.updated_at = Utc::now();
    }
}

/// Embedding for a single text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub text: String,
    pub embedding: Vec<f32>,
    pub model: String,
    /// Served from the embedding cache
    pub cached: bool,
}

/// Token accounting reported by the embedding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Embeddings for a batch of texts, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEmbedding {
    pub results: Vec<Embedding>,
    pub usage: TokenUsage,
}

/// Generates embeddings.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed one text.
    async fn generate_embedding(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts in one call.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<BatchEmbedding>;
}

/// Memory storage.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Fetch a memory, failing with [`JobError::MemoryNotFound`](crate::JobError::MemoryNotFound)
    /// when it does not exist.
    async fn find_by_id(&self, id: Uuid) -> Result<Memory>;

    /// Page through a user's memories.
    async fn find_by_user_id(&self, user_id: Uuid, limit: usize, offset: usize) -> Result<Vec<Memory>>;

    /// Persist changes to an existing memory.
    async fn update(&self, memory: &Memory) -> Result<()>;
}
