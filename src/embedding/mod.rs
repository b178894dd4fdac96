// src/embedding/mod.rs
//! Embedding service: text -> unit-length vector of fixed dimension, with a
//! mandatory determinism cache (spec §4.1).

mod mock;
mod provider;

pub use mock::MockEmbeddingProvider;
pub use provider::HttpEmbeddingProvider;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embedding: Vec<f32>,
    pub tokens_used: usize,
}

/// The embedding provider collaborator. Treated as opaque and pluggable;
/// the core only relies on determinism and unit length, never on any
/// specific geometric structure (spec §9 Open Question).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_raw(&self, text: &str) -> anyhow::Result<EmbeddingOutput>;
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
}

type CacheKey = (String, String, usize);

/// Wraps any `EmbeddingProvider` with the mandatory cache and the
/// degrade-on-failure policy from spec §7 (`upstream_failure`).
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Mutex<HashMap<CacheKey, EmbeddingOutput>>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// `f(x) = f(x)` deterministically within a process; empty text is
    /// rejected rather than silently producing a zero vector.
    pub async fn embed(&self, text: &str) -> VaultResult<EmbeddingOutput> {
        if text.trim().is_empty() {
            return Err(VaultError::invalid("cannot embed empty text"));
        }

        let key: CacheKey = (
            text.to_string(),
            self.provider.model_name().to_string(),
            self.provider.dimension(),
        );

        if let Some(cached) = self.cache.lock().get(&key).cloned() {
            return Ok(cached);
        }

        let out = self
            .provider
            .embed_raw(text)
            .await
            .map_err(VaultError::upstream)?;

        let norm: f32 = out.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return Err(VaultError::upstream("provider returned a degenerate vector"));
        }
        let unit: Vec<f32> = out.embedding.iter().map(|v| v / norm).collect();
        let unit_out = EmbeddingOutput {
            embedding: unit,
            tokens_used: out.tokens_used,
        };

        self.cache.lock().insert(key, unit_out.clone());
        Ok(unit_out)
    }
}

impl Clone for EmbeddingOutput {
    fn clone(&self) -> Self {
        Self {
            embedding: self.embedding.clone(),
            tokens_used: self.tokens_used,
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    // a and b are expected unit-length already; clamp for float drift.
    dot.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_unit_length() {
        let svc = EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(16)));
        let a = svc.embed("hello world").await.unwrap();
        let b = svc.embed("hello world").await.unwrap();
        assert_eq!(a.embedding, b.embedding);
        let norm: f32 = a.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn distinct_text_distinct_vector() {
        let svc = EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(16)));
        let a = svc.embed("alpha").await.unwrap();
        let b = svc.embed("beta").await.unwrap();
        assert_ne!(a.embedding, b.embedding);
    }

    #[tokio::test]
    async fn empty_text_rejected() {
        let svc = EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(16)));
        assert!(svc.embed("").await.is_err());
    }
}
