// src/retrospective/mod.rs
//! Bayesian utility update, decay, recency boost, and the immediate-outcome
//! fast path (spec §4.10). Reads `retrieval_records`/`outcomes` written by
//! the retrieval pipeline and `record_outcome`; writes back through
//! `SemanticStore::batch_update_utility`.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{VaultError, VaultResult};
use crate::retrieval::records::retrievals_in_window;
use crate::semantic::{SemanticStore, UtilityUpdate};

const ALPHA: f32 = 1.0;
const BETA: f32 = 1.0;
const MOMENTUM: f32 = 0.7;
const DECAY_RATE: f32 = 0.05;
const RECENCY_BOOST: f32 = 0.1;
const RECENCY_CAP_DAYS: f32 = 7.0;
const MIN_SCORE: f32 = 0.1;

/// Retrieval/outcome counting window for the batch update (spec §4.10:
/// "Window: last 7 days").
pub const UTILITY_UPDATE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Used,
    Helpful,
    NotHelpful,
    Ignored,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Used => "used",
            Self::Helpful => "helpful",
            Self::NotHelpful => "not_helpful",
            Self::Ignored => "ignored",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "used" => Self::Used,
            "helpful" => Self::Helpful,
            "not_helpful" => Self::NotHelpful,
            "ignored" => Self::Ignored,
            _ => return None,
        })
    }

    /// Immediate delta applied at `record_outcome` time, before clamping
    /// (spec §4.10).
    fn delta(&self) -> f32 {
        match self {
            Self::Used => 0.02,
            Self::Helpful => 0.10,
            Self::NotHelpful => -0.05,
            Self::Ignored => -0.02,
        }
    }
}

/// `recordOutcome`: applies an immediate clamped delta and appends to
/// outcome history (spec §4.10).
pub async fn record_outcome(
    pool: &SqlitePool,
    store: &SemanticStore,
    memory_id: &str,
    conversation_id: Option<&str>,
    outcome: Outcome,
    context: Option<&str>,
) -> VaultResult<f32> {
    let current = store
        .get(memory_id)
        .ok_or_else(|| VaultError::not_found(format!("memory {memory_id}")))?;
    let new_score = (current.utility_score + outcome.delta()).clamp(MIN_SCORE, 1.0);

    store
        .batch_update_utility(&[UtilityUpdate {
            memory_id: memory_id.to_string(),
            new_score,
        }])
        .await?;

    sqlx::query(
        "INSERT INTO outcomes (id, memory_id, conversation_id, outcome, context, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(memory_id)
    .bind(conversation_id)
    .bind(outcome.as_str())
    .bind(context)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(VaultError::upstream)?;

    Ok(new_score)
}

async fn helpful_and_retrieved_counts(pool: &SqlitePool, memory_id: &str, window_days: i64) -> VaultResult<(f32, f32)> {
    let retrieved = retrievals_in_window(pool, memory_id, window_days).await?.len() as f32;

    let cutoff = Utc::now() - chrono::Duration::days(window_days);
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT outcome FROM outcomes WHERE memory_id = ? AND timestamp >= ?",
    )
    .bind(memory_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .map_err(VaultError::upstream)?;

    let helpful = rows
        .iter()
        .filter(|(o,)| Outcome::from_str(o) == Some(Outcome::Helpful))
        .count() as f32;

    Ok((helpful, retrieved))
}

/// Daily batch pass over every memory for a user (spec §4.10/§4.9):
/// retrieved memories get the Bayesian update plus recency boost;
/// un-retrieved memories decay. `window_days` bounds which retrieval/outcome
/// history counts toward the Bayesian estimate.
pub async fn run_batch_update(
    pool: &SqlitePool,
    store: &SemanticStore,
    window_days: i64,
) -> VaultResult<usize> {
    let memories = store.filter(&crate::semantic::MemoryFilterCriteria {
        include_superseded: true,
        ..Default::default()
    });

    let mut updates = Vec::with_capacity(memories.len());
    for mem in &memories {
        let (helpful, retrieved) = helpful_and_retrieved_counts(pool, &mem.id, window_days).await?;

        let new_score = if retrieved > 0.0 {
            let bayesian = (helpful + ALPHA) / (retrieved + ALPHA + BETA);
            let blended = MOMENTUM * mem.utility_score + (1.0 - MOMENTUM) * bayesian;
            let age_days = (Utc::now() - mem.last_accessed_at).num_seconds() as f32 / 86_400.0;
            let capped_age = age_days.max(0.0).min(RECENCY_CAP_DAYS);
            let recency = RECENCY_BOOST * (-capped_age / 7.0).exp();
            blended + recency
        } else {
            mem.utility_score * (1.0 - DECAY_RATE)
        };

        updates.push(UtilityUpdate {
            memory_id: mem.id.clone(),
            new_score: new_score.clamp(MIN_SCORE, 1.0),
        });
    }

    let count = updates.len();
    store.batch_update_utility(&updates).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::records::insert_retrieval_record;
    use crate::semantic::{MemoryCategory, MemorySource, SourceType};
    use crate::test_support::test_pool;

    async fn make_store(pool: SqlitePool) -> SemanticStore {
        SemanticStore::load(pool, "u1".to_string()).await.unwrap()
    }

    fn src() -> MemorySource {
        MemorySource {
            source_type: SourceType::ExplicitApi,
            source_id: "t".into(),
            timestamp: Utc::now(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn record_outcome_helpful_raises_score() {
        let pool = test_pool().await;
        let store = make_store(pool.clone()).await;
        let mem = store.create("x".into(), MemoryCategory::Preferences, src(), None, 0.8).await.unwrap();
        assert_eq!(mem.utility_score, 0.5);

        let score = record_outcome(&pool, &store, &mem.id, None, Outcome::Helpful, None).await.unwrap();
        assert!(score > 0.5);
    }

    #[tokio::test]
    async fn record_outcome_not_helpful_lowers_score() {
        let pool = test_pool().await;
        let store = make_store(pool.clone()).await;
        let mem = store.create("x".into(), MemoryCategory::Preferences, src(), None, 0.8).await.unwrap();

        let score = record_outcome(&pool, &store, &mem.id, None, Outcome::NotHelpful, None).await.unwrap();
        assert!(score < 0.5);
    }

    #[tokio::test]
    async fn three_helpful_outcomes_approach_point_eight() {
        let pool = test_pool().await;
        let store = make_store(pool.clone()).await;
        let mem = store.create("x".into(), MemoryCategory::Preferences, src(), None, 0.8).await.unwrap();

        let mut score = 0.5;
        for _ in 0..3 {
            score = record_outcome(&pool, &store, &mem.id, None, Outcome::Helpful, None).await.unwrap();
        }
        assert!((score - 0.8).abs() < 0.01);

        score = record_outcome(&pool, &store, &mem.id, None, Outcome::NotHelpful, None).await.unwrap();
        assert!((score - 0.75).abs() < 0.01);
    }

    #[tokio::test]
    async fn unretrieved_memory_decays() {
        let pool = test_pool().await;
        let store = make_store(pool.clone()).await;
        let mem = store.create("x".into(), MemoryCategory::Preferences, src(), None, 0.8).await.unwrap();

        run_batch_update(&pool, &store, 30).await.unwrap();
        let updated = store.get(&mem.id).unwrap();
        assert!((updated.utility_score - 0.475).abs() < 1e-4);
    }

    #[tokio::test]
    async fn retrieved_memory_gets_bayesian_update() {
        let pool = test_pool().await;
        let store = make_store(pool.clone()).await;
        let mem = store.create("x".into(), MemoryCategory::Preferences, src(), None, 0.8).await.unwrap();
        insert_retrieval_record(&pool, &mem.id, "q").await.unwrap();

        run_batch_update(&pool, &store, 30).await.unwrap();
        let updated = store.get(&mem.id).unwrap();
        // bayesian = (0+1)/(1+2) = 0.333; blended = 0.7*0.5 + 0.3*0.333 = 0.45
        assert!(updated.utility_score >= 0.45);
    }
}
