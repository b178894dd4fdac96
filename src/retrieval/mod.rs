// src/retrieval/mod.rs
//! `retrieveContext(query, userId, opts)` — spec §4.6: embed, filter,
//! score, sort, drop below threshold, diversify, budget-select, record.

pub mod records;
pub mod scoring;

use std::time::Instant;

use sqlx::SqlitePool;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingService;
use crate::episodic::estimate_tokens;
use crate::error::VaultResult;
use crate::semantic::{MemoryCategory, MemoryFilterCriteria, SemanticMemory, SemanticStore};
use scoring::{diversify, score_candidate, sort_candidates, ScoredCandidate};

#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub categories: Option<Vec<MemoryCategory>>,
    pub excluded_ids: Vec<String>,
    pub boost_recent: bool,
    pub boost_high_utility: bool,
    pub min_relevance: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl RetrieveOptions {
    pub fn defaults_enabled() -> Self {
        Self {
            boost_recent: true,
            boost_high_utility: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: SemanticMemory,
    pub relevance_score: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub memories: Vec<RetrievedMemory>,
    pub tokens_used: usize,
    pub total_candidates: usize,
    pub retrieval_time_ms: u128,
}

impl RetrievalOutcome {
    /// The neutral result returned when `enableMemoryVault` is off (spec §7).
    pub fn empty() -> Self {
        Self {
            memories: Vec::new(),
            tokens_used: 0,
            total_candidates: 0,
            retrieval_time_ms: 0,
        }
    }
}

pub async fn retrieve_context(
    pool: &SqlitePool,
    store: &SemanticStore,
    embeddings: &EmbeddingService,
    query: &str,
    opts: &RetrieveOptions,
    cfg: &RetrievalConfig,
) -> VaultResult<RetrievalOutcome> {
    let started = Instant::now();

    if query.trim().is_empty() {
        return Ok(RetrievalOutcome {
            memories: Vec::new(),
            tokens_used: 0,
            total_candidates: 0,
            retrieval_time_ms: started.elapsed().as_millis(),
        });
    }

    let query_embedding = embeddings.embed(query).await?.embedding;

    let criteria = MemoryFilterCriteria {
        categories: opts.categories.clone(),
        min_confidence: Some(cfg.min_confidence),
        ..Default::default()
    };
    let candidates: Vec<SemanticMemory> = store
        .filter(&criteria)
        .into_iter()
        .filter(|m| !opts.excluded_ids.contains(&m.id))
        .collect();
    let total_candidates = candidates.len();

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|memory| {
            let score = score_candidate(
                &memory,
                &query_embedding,
                cfg,
                opts.boost_recent,
                opts.boost_high_utility,
            );
            ScoredCandidate { memory, score }
        })
        .collect();

    sort_candidates(&mut scored);

    let min_relevance = opts.min_relevance.unwrap_or(cfg.min_relevance);
    scored.retain(|c| c.score >= min_relevance);

    let diversified = diversify(scored, cfg.diversification_lambda);

    let max_tokens = opts.max_tokens.unwrap_or(cfg.max_tokens);
    let mut selected = Vec::new();
    let mut tokens_used = 0usize;
    for candidate in diversified {
        let cost = estimate_tokens(&candidate.memory.content);
        if tokens_used + cost > max_tokens {
            continue; // keep trying smaller candidates after a skip
        }
        tokens_used += cost;
        selected.push(candidate);
    }

    let mut out = Vec::with_capacity(selected.len());
    for candidate in selected {
        records::insert_retrieval_record(pool, &candidate.memory.id, query).await?;
        store.record_access(&candidate.memory.id).await?;
        out.push(RetrievedMemory {
            relevance_score: candidate.score,
            memory: candidate.memory,
        });
    }

    Ok(RetrievalOutcome {
        memories: out,
        tokens_used,
        total_candidates,
        retrieval_time_ms: started.elapsed().as_millis(),
    })
}

/// Hybrid search: plain substring matches receive a `text_match_bonus`
/// before being merged with semantic results and pushed through the same
/// budgeter (spec §4.6).
pub async fn search_memories(
    pool: &SqlitePool,
    store: &SemanticStore,
    embeddings: &EmbeddingService,
    query: &str,
    opts: &RetrieveOptions,
    cfg: &RetrievalConfig,
) -> VaultResult<RetrievalOutcome> {
    let mut outcome = retrieve_context(pool, store, embeddings, query, opts, cfg).await?;
    let needle = query.to_lowercase();
    for rm in outcome.memories.iter_mut() {
        if rm.memory.content.to_lowercase().contains(&needle) {
            rm.relevance_score = (rm.relevance_score + cfg.text_match_bonus).min(1.0);
        }
    }
    sort_by_relevance(&mut outcome.memories);
    Ok(outcome)
}

fn sort_by_relevance(memories: &mut [RetrievedMemory]) {
    memories.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingService, MockEmbeddingProvider};
    use crate::semantic::{MemorySource, SourceType};
    use crate::test_support::test_pool;
    use std::sync::Arc;

    async fn setup() -> (SqlitePool, SemanticStore, EmbeddingService) {
        let pool = test_pool().await;
        let store = SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap();
        let embeddings = EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(16)));
        (pool, store, embeddings)
    }

    #[tokio::test]
    async fn empty_query_returns_empty() {
        let (pool, store, embeddings) = setup().await;
        let cfg = RetrievalConfig::default();
        let out = retrieve_context(&pool, &store, &embeddings, "", &RetrieveOptions::default(), &cfg)
            .await
            .unwrap();
        assert!(out.memories.is_empty());
        assert_eq!(out.tokens_used, 0);
    }

    #[tokio::test]
    async fn low_confidence_excluded_by_default_floor() {
        let (pool, store, embeddings) = setup().await;
        store
            .create(
                "I like dark mode".into(),
                MemoryCategory::Preferences,
                MemorySource {
                    source_type: SourceType::ExplicitApi,
                    source_id: "s".into(),
                    timestamp: chrono::Utc::now(),
                    confidence: 0.9,
                },
                Some(embeddings.embed("I like dark mode").await.unwrap().embedding),
                0.3,
            )
            .await
            .unwrap();

        let cfg = RetrievalConfig {
            min_relevance: 0.0,
            ..RetrievalConfig::default()
        };
        let out = retrieve_context(
            &pool,
            &store,
            &embeddings,
            "dark mode",
            &RetrieveOptions::default(),
            &cfg,
        )
        .await
        .unwrap();
        // confidence floor of 0.5 excludes this memory from candidates
        assert!(out.memories.is_empty());
    }
}
