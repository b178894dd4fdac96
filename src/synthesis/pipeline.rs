// src/synthesis/pipeline.rs
//! Drains the queue: conversation -> extracted facts -> persisted semantic
//! memories + conversation summary (spec §4.7/§4.8).

use std::sync::Arc;

use tracing::{error, info};

use crate::embedding::EmbeddingService;
use crate::episodic::EpisodicStore;
use crate::error::VaultResult;
use crate::semantic::{MemoryFilterCriteria, MemorySource, SemanticStore, SourceType};

use super::extractor::LlmExtractor;
use super::queue::SynthesisQueue;
use super::types::{ContradictionResolution, JobStatus, SynthesisResult};

pub struct SynthesisPipeline {
    queue: Arc<SynthesisQueue>,
    extractor: Arc<LlmExtractor>,
    episodic: Arc<EpisodicStore>,
    semantic: Arc<SemanticStore>,
    embeddings: Arc<EmbeddingService>,
}

impl SynthesisPipeline {
    pub fn new(
        queue: Arc<SynthesisQueue>,
        extractor: Arc<LlmExtractor>,
        episodic: Arc<EpisodicStore>,
        semantic: Arc<SemanticStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            queue,
            extractor,
            episodic,
            semantic,
            embeddings,
        }
    }

    /// Pops one job and drives it through extraction + persistence. Returns
    /// `Ok(None)` when the queue is empty. A failed attempt re-queues (with
    /// the caller-applied backoff) until `max_attempts` is exhausted, at
    /// which point the job is marked `failed` and the error is swallowed
    /// here (spec §4.7) — callers poll job status rather than propagating.
    pub async fn process_next(&self) -> VaultResult<Option<SynthesisResult>> {
        let Some(job) = self.queue.dequeue().await else {
            return Ok(None);
        };

        match self.run_job(&job.conversation_id).await {
            Ok(result) => {
                self.queue.mark_completed(&job.id);
                info!(conversation_id = %job.conversation_id, facts = result.created_memory_ids.len(), "synthesis job completed");
                Ok(Some(result))
            }
            Err(err) => {
                error!(conversation_id = %job.conversation_id, attempt = job.attempts, %err, "synthesis job failed");
                if job.attempts < job.max_attempts {
                    let delay = std::time::Duration::from_secs(2u64.pow(job.attempts));
                    tokio::time::sleep(delay).await;
                }
                self.queue.requeue_or_fail(job, err.to_string()).await;
                Ok(None)
            }
        }
    }

    /// Drains up to `batch_size` jobs, one at a time, stopping early once
    /// the queue runs dry.
    pub async fn process_all(&self, batch_size: usize) -> VaultResult<Vec<SynthesisResult>> {
        let mut results = Vec::new();
        for _ in 0..batch_size {
            match self.process_next().await? {
                Some(result) => results.push(result),
                None => break,
            }
        }
        Ok(results)
    }

    async fn run_job(&self, conversation_id: &str) -> VaultResult<SynthesisResult> {
        let conversation = self
            .episodic
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| crate::error::VaultError::not_found(format!("conversation {conversation_id}")))?;
        let messages = self.episodic.get_messages(conversation_id).await?;

        let existing = self.semantic.filter(&MemoryFilterCriteria::default());

        let extraction = self
            .extractor
            .extract(&conversation, &messages, &existing)
            .await;

        let mut new_ids_by_fact_index = Vec::with_capacity(extraction.facts.len());
        for fact in &extraction.facts {
            let embedding = self.embeddings.embed(&fact.content).await.ok().map(|e| e.embedding);
            let source = MemorySource {
                source_type: SourceType::Conversation,
                source_id: conversation_id.to_string(),
                timestamp: chrono::Utc::now(),
                confidence: fact.confidence,
            };
            let created = self
                .semantic
                .create(fact.content.clone(), fact.category, source, embedding, fact.confidence)
                .await?;

            if !fact.topics.is_empty() {
                self.semantic
                    .update(
                        &created.id,
                        crate::semantic::MemoryMetadata {
                            topics: fact.topics.clone(),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            for old_id in &fact.supersedes {
                self.semantic.mark_supersession(&created.id, old_id).await.ok();
            }
            new_ids_by_fact_index.push(created.id);
        }

        for contradiction in &extraction.contradictions {
            let Some(new_id) = new_ids_by_fact_index.get(contradiction.new_fact_index) else {
                continue;
            };
            match contradiction.resolution {
                ContradictionResolution::ReplaceWithNew => {
                    self.semantic
                        .mark_supersession(new_id, &contradiction.existing_memory_id)
                        .await
                        .ok();
                }
                ContradictionResolution::KeepExisting | ContradictionResolution::KeepBoth => {
                    self.semantic
                        .mark_contradiction(new_id, &contradiction.existing_memory_id)
                        .await
                        .ok();
                }
            }
        }

        if !extraction.summary.trim().is_empty() {
            self.episodic.set_summary(conversation_id, extraction.summary.clone()).await?;
        }

        Ok(SynthesisResult {
            conversation_id: conversation_id.to_string(),
            created_memory_ids: new_ids_by_fact_index,
            summary: extraction.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::episodic::{DeviceType, Message, Role};
    use crate::synthesis::extractor::ExtractorProvider;
    use crate::test_support::test_pool;
    use async_trait::async_trait;

    struct FixedProvider(String);

    #[async_trait]
    impl ExtractorProvider for FixedProvider {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn successful_job_creates_memories_and_summary() {
        let pool = test_pool().await;
        let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
        let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8))));

        let session = episodic.start_session(DeviceType::Web).await.unwrap();
        let conv = episodic.start_conversation(session.id.clone(), None).await.unwrap();
        episodic
            .add_message(&conv.id, &Message::new(Role::User, "I prefer dark mode".into(), chrono::Utc::now(), None))
            .await
            .unwrap();

        let body = serde_json::json!({
            "facts": [{"content": "prefers dark mode", "category": "preferences", "confidence": 0.9}],
            "summary": "discussed UI preferences",
            "contradictions": []
        })
        .to_string();
        let extractor = Arc::new(LlmExtractor::new(Arc::new(FixedProvider(body))));

        let queue = Arc::new(SynthesisQueue::new());
        queue.enqueue(conv.id.clone(), "u1".into(), super::super::types::JobPriority::Normal).await;

        let pipeline = SynthesisPipeline::new(queue, extractor, episodic.clone(), semantic.clone(), embeddings);
        let result = pipeline.process_next().await.unwrap().unwrap();

        assert_eq!(result.created_memory_ids.len(), 1);
        let loaded = episodic.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.summary.unwrap(), "discussed UI preferences");
    }

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let pool = test_pool().await;
        let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
        let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8))));
        let extractor = Arc::new(LlmExtractor::new(Arc::new(FixedProvider("{}".into()))));
        let queue = Arc::new(SynthesisQueue::new());

        let pipeline = SynthesisPipeline::new(queue, extractor, episodic, semantic, embeddings);
        assert!(pipeline.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_conversation_requeues_then_fails() {
        let pool = test_pool().await;
        let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
        let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8))));
        let extractor = Arc::new(LlmExtractor::new(Arc::new(FixedProvider("{}".into()))));

        let queue = Arc::new(SynthesisQueue::new());
        queue.enqueue("missing-conv".into(), "u1".into(), super::super::types::JobPriority::Normal).await;
        let pipeline = SynthesisPipeline::new(queue.clone(), extractor, episodic, semantic, embeddings);

        for _ in 0..3 {
            assert!(pipeline.process_next().await.unwrap().is_none());
        }
        assert!(queue.is_empty().await);
    }
}
