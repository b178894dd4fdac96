// src/retrieval/scoring.rs
//! Scoring, filtering, and diversification are plain synchronous functions
//! over an already-fetched candidate set (spec §4.6 / SPEC_FULL §4.6) — only
//! the embedding call and the store read that produced the candidates are
//! `async`.

use chrono::Utc;

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::semantic::SemanticMemory;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub memory: SemanticMemory,
    pub score: f32,
}

pub fn score_candidate(memory: &SemanticMemory, query_embedding: &[f32], cfg: &RetrievalConfig, boost_recent: bool, boost_high_utility: bool) -> f32 {
    let similarity = memory
        .embedding
        .as_ref()
        .map(|e| cosine_similarity(query_embedding, e))
        .unwrap_or(0.0);

    let recency_boost = if boost_recent {
        let days_since = (Utc::now() - memory.last_accessed_at).num_seconds() as f32 / 86_400.0;
        (-days_since.max(0.0) / cfg.decay_days).exp() * cfg.recency_weight
    } else {
        0.0
    };

    let utility_boost = if boost_high_utility {
        memory.utility_score * cfg.utility_weight
    } else {
        0.0
    };

    let contradiction_penalty = if !memory.metadata.contradicts.is_empty() {
        1.0 - cfg.contradiction_factor
    } else {
        0.0
    };

    let raw = (similarity * cfg.similarity_weight + recency_boost + utility_boost)
        * (1.0 - contradiction_penalty);
    raw.clamp(0.0, 1.0)
}

/// Sort by score desc; newer `created_at` wins ties, then lower `id`
/// lexicographically (spec §4.6).
pub fn sort_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

/// Greedy diversification: at each step pick the candidate maximizing
/// `score*(1-d) + (1-max_sim_to_selected)*d`, O(k*n) in candidate count
/// (spec §4.6).
pub fn diversify(candidates: Vec<ScoredCandidate>, lambda: f32) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return candidates;
    }
    let mut remaining = candidates;
    let mut selected: Vec<ScoredCandidate> = Vec::with_capacity(remaining.len());

    // First pick is always the top-scored candidate.
    remaining.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    selected.push(remaining.remove(0));

    while !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_value = f32::MIN;
        for (idx, cand) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| {
                    match (&cand.memory.embedding, &s.memory.embedding) {
                        (Some(a), Some(b)) => cosine_similarity(a, b),
                        _ => 0.0,
                    }
                })
                .fold(f32::MIN, f32::max);
            let max_sim = if max_sim == f32::MIN { 0.0 } else { max_sim };
            let value = cand.score * (1.0 - lambda) + (1.0 - max_sim) * lambda;
            if value > best_value {
                best_value = value;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected
}
