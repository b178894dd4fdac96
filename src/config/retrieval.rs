// src/config/retrieval.rs
use serde::{Deserialize, Serialize};

/// Default weights and thresholds for the retrieval pipeline (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub similarity_weight: f32,
    pub recency_weight: f32,
    pub utility_weight: f32,
    pub contradiction_factor: f32,
    pub decay_days: f32,
    pub min_relevance: f32,
    pub min_confidence: f32,
    pub max_tokens: usize,
    pub diversification_lambda: f32,
    /// Substring-match bonus applied in `searchMemories` hybrid mode.
    pub text_match_bonus: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.5,
            recency_weight: 0.2,
            utility_weight: 0.3,
            contradiction_factor: 0.7,
            decay_days: 30.0,
            min_relevance: 0.6,
            min_confidence: 0.5,
            max_tokens: 4000,
            diversification_lambda: 0.3,
            text_match_bonus: 0.2,
        }
    }
}
