//! Embedding jobs running through a real queue

use async_trait::async_trait;
use membank_jobs::*;
use membank_queue::store::MemoryStore;
use membank_queue::{JobQueue, JobResult as QueueJobResult, JobStatus, QueueConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct CountingEmbeddings {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbeddings {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

#[async_trait]
impl EmbeddingService for CountingEmbeddings {
    async fn generate_embedding(&self, text: &str) -> membank_jobs::Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(JobError::Embedding("provider unavailable".into()));
        }
        Ok(Embedding {
            text: text.to_string(),
            embedding: vec![0.5; 8],
            model: "it-model".into(),
            cached: false,
        })
    }

    async fn generate_embeddings(&self, texts: &[String]) -> membank_jobs::Result<BatchEmbedding> {
        let mut results = Vec::new();
        for text in texts {
            results.push(self.generate_embedding(text).await?);
        }
        Ok(BatchEmbedding {
            results,
            usage: TokenUsage::default(),
        })
    }
}

#[derive(Default)]
struct Memories(Mutex<HashMap<Uuid, Memory>>);

#[async_trait]
impl MemoryRepository for Memories {
    async fn find_by_id(&self, id: Uuid) -> membank_jobs::Result<Memory> {
        self.0.lock().get(&id).cloned().ok_or(JobError::MemoryNotFound(id))
    }

    async fn find_by_user_id(&self, user_id: Uuid, limit: usize, offset: usize) -> membank_jobs::Result<Vec<Memory>> {
        Ok(self
            .0
            .lock()
            .values()
            .filter(|m| m.user_id == user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, memory: &Memory) -> membank_jobs::Result<()> {
        self.0.lock().insert(memory.id, memory.clone());
        Ok(())
    }
}

fn queue() -> JobQueue {
    let config = QueueConfig::new("embeddings")
        .with_max_retries(1)
        .with_retry_delay(Duration::from_millis(10))
        .with_poll_interval(Duration::from_millis(5));
    JobQueue::with_store(MemoryStore::new(), config)
}

async fn wait_for_result(queue: &JobQueue, id: &str) -> QueueJobResult {
    for _ in 0..1000 {
        match queue.get_job_result(id).await {
            Ok(result) => return result,
            Err(e) if e.is_not_found() => tokio::time::sleep(Duration::from_millis(5)).await,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    panic!("no result for job {}", id);
}

#[tokio::test]
async fn test_generate_and_batch_jobs_through_queue() {
    let queue = queue();
    let embeddings = Arc::new(CountingEmbeddings::new(false));
    let memories = Arc::new(Memories::default());

    let user = Uuid::new_v4();
    let single = Memory::new(user, "first memory");
    let single_id = single.id;
    memories.0.lock().insert(single_id, single);
    for i in 0..3 {
        let memory = Memory::new(user, format!("batch memory {}", i));
        memories.0.lock().insert(memory.id, memory);
    }

    register_embedding_handlers(queue.pool().registry(), embeddings.clone(), memories.clone());
    queue.start_consuming(CancellationToken::new(), 1).unwrap();

    let factory = JobFactory::new();
    let single_job = queue.enqueue(factory.generate_embedding(single_id, 10)).await.unwrap();
    let result = wait_for_result(&queue, &single_job).await;
    assert_eq!(result.status, JobStatus::Completed);
    assert!(memories.0.lock()[&single_id].has_embedding());

    let batch_job = queue.enqueue(factory.batch_embedding(user, 10, 1)).await.unwrap();
    let result = wait_for_result(&queue, &batch_job).await;
    queue.close().await.unwrap();

    assert_eq!(result.status, JobStatus::Completed);
    let payload = result.result.unwrap();
    assert_eq!(payload["processed_count"], 3);
    assert!(memories.0.lock().values().all(|m| m.has_embedding()));
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_provider_failure_is_retried_then_failed() {
    let queue = queue();
    let embeddings = Arc::new(CountingEmbeddings::new(true));
    let memories = Arc::new(Memories::default());

    let memory = Memory::new(Uuid::new_v4(), "unlucky");
    let memory_id = memory.id;
    memories.0.lock().insert(memory_id, memory);

    register_embedding_handlers(queue.pool().registry(), embeddings.clone(), memories);
    queue.start_consuming(CancellationToken::new(), 1).unwrap();

    let id = queue
        .enqueue(JobFactory::new().generate_embedding(memory_id, 5))
        .await
        .unwrap();
    let result = wait_for_result(&queue, &id).await;
    queue.close().await.unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.retries, 1);
    assert_eq!(
        result.error.as_deref(),
        Some("Embedding error: provider unavailable")
    );
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_payload_fails() {
    let queue = queue();
    register_embedding_handlers(
        queue.pool().registry(),
        Arc::new(CountingEmbeddings::new(false)),
        Arc::new(Memories::default()),
    );
    queue.start_consuming(CancellationToken::new(), 1).unwrap();

    let job = membank_queue::Job::new(JOB_TYPE_GENERATE_EMBEDDING)
        .with_field("memory_id", "not-a-uuid")
        .with_max_retries(0);
    let id = queue.enqueue(job).await.unwrap();
    let result = wait_for_result(&queue, &id).await;
    queue.close().await.unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.unwrap().starts_with("Invalid job payload"));
}
