// tests/synthesis_retry_test.rs
//
// S5: an extractor call that fails twice before succeeding still yields a
// completed job with exactly one conversation summary written.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use osqr_vault::embedding::{EmbeddingService, MockEmbeddingProvider};
use osqr_vault::episodic::{DeviceType, EpisodicStore, Message, Role};
use osqr_vault::semantic::SemanticStore;
use osqr_vault::synthesis::{ExtractorProvider, JobPriority, LlmExtractor, SynthesisPipeline, SynthesisQueue};
use osqr_vault::test_support::test_pool;

struct FlakyProvider {
    calls: AtomicUsize,
    body: String,
}

#[async_trait]
impl ExtractorProvider for FlakyProvider {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            Err(anyhow::anyhow!("simulated transient failure"))
        } else {
            Ok(self.body.clone())
        }
    }
}

#[tokio::test]
async fn job_recovers_after_two_failures_and_writes_one_summary() {
    let pool = test_pool().await;
    let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
    let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
    let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8))));

    let session = episodic.start_session(DeviceType::Web).await.unwrap();
    let conv = episodic.start_conversation(session.id.clone(), None).await.unwrap();
    episodic
        .add_message(&conv.id, &Message::new(Role::User, "let's talk about scheduling".into(), chrono::Utc::now(), None))
        .await
        .unwrap();

    let body = serde_json::json!({
        "facts": [{"content": "discussed scheduling", "category": "projects", "confidence": 0.9}],
        "summary": "Talked about scheduling",
        "contradictions": []
    })
    .to_string();

    let provider = Arc::new(FlakyProvider { calls: AtomicUsize::new(0), body });
    let extractor = Arc::new(LlmExtractor::new(provider));

    let queue = Arc::new(SynthesisQueue::new());
    queue.enqueue(conv.id.clone(), "u1".into(), JobPriority::Normal).await;
    let pipeline = SynthesisPipeline::new(queue.clone(), extractor, episodic.clone(), semantic.clone(), embeddings);

    let result = pipeline.process_next().await.unwrap().expect("job completes once the extractor recovers");
    assert_eq!(result.created_memory_ids.len(), 1);
    assert_eq!(result.summary, "Talked about scheduling");

    let loaded = episodic.get_conversation(&conv.id).await.unwrap().unwrap();
    assert_eq!(loaded.summary.as_deref(), Some("Talked about scheduling"));
    assert!(queue.is_empty().await);
}
