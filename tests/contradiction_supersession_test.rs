// tests/contradiction_supersession_test.rs
//
// S2: a new fact that supersedes an existing memory outranks it on a
// subsequent retrieval for the same question.

use std::sync::Arc;

use osqr_vault::config::RetrievalConfig;
use osqr_vault::embedding::{EmbeddingService, MockEmbeddingProvider};
use osqr_vault::episodic::{DeviceType, EpisodicStore, Message, Role};
use osqr_vault::retrieval::{retrieve_context, RetrieveOptions};
use osqr_vault::semantic::{MemoryCategory, MemorySource, SemanticStore, SourceType};
use osqr_vault::synthesis::{ExtractorProvider, JobPriority, LlmExtractor, SynthesisPipeline, SynthesisQueue};
use osqr_vault::test_support::test_pool;

use async_trait::async_trait;

struct FixedProvider(String);

#[async_trait]
impl ExtractorProvider for FixedProvider {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn new_employer_supersedes_old_and_outranks_it() {
    let pool = test_pool().await;
    let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
    let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
    let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(16))));

    let m1 = semantic
        .create(
            "I work at OldCo".into(),
            MemoryCategory::BusinessInfo,
            MemorySource {
                source_type: SourceType::ExplicitApi,
                source_id: "seed".into(),
                timestamp: chrono::Utc::now(),
                confidence: 0.9,
            },
            Some(embeddings.embed("I work at OldCo").await.unwrap().embedding),
            0.9,
        )
        .await
        .unwrap();
    semantic
        .batch_update_utility(&[osqr_vault::semantic::UtilityUpdate { memory_id: m1.id.clone(), new_score: 0.5 }])
        .await
        .unwrap();

    let session = episodic.start_session(DeviceType::Web).await.unwrap();
    let conv = episodic.start_conversation(session.id.clone(), None).await.unwrap();
    episodic
        .add_message(&conv.id, &Message::new(Role::User, "I just joined NewCo".into(), chrono::Utc::now(), None))
        .await
        .unwrap();

    let body = serde_json::json!({
        "facts": [{
            "content": "Now works at NewCo",
            "category": "business_info",
            "confidence": 0.9,
            "topics": ["employer"],
            "supersedes": [m1.id]
        }],
        "summary": "User changed jobs",
        "contradictions": []
    })
    .to_string();
    let extractor = Arc::new(LlmExtractor::new(Arc::new(FixedProvider(body))));
    let queue = Arc::new(SynthesisQueue::new());
    queue.enqueue(conv.id.clone(), "u1".into(), JobPriority::Normal).await;
    let pipeline = SynthesisPipeline::new(queue, extractor, episodic.clone(), semantic.clone(), embeddings.clone());
    let result = pipeline.process_next().await.unwrap().unwrap();
    let m2_id = result.created_memory_ids[0].clone();

    let m2 = semantic.get(&m2_id).unwrap();
    assert_eq!(m2.metadata.supersedes, vec![m1.id.clone()]);

    let cfg = RetrievalConfig { min_relevance: 0.0, ..RetrievalConfig::default() };
    let outcome = retrieve_context(
        &pool,
        &semantic,
        &embeddings,
        "where do I work",
        &RetrieveOptions::defaults_enabled(),
        &cfg,
    )
    .await
    .unwrap();

    let rank_of = |id: &str| outcome.memories.iter().position(|rm| rm.memory.id == id);
    let m1_rank = rank_of(&m1.id);
    let m2_rank = rank_of(&m2_id);
    assert!(m2_rank.is_some(), "superseding memory should be retrievable");
    if let (Some(r1), Some(r2)) = (m1_rank, m2_rank) {
        assert!(r2 < r1, "M2 should rank above M1");
    }
}
