// src/embedding/mock.rs
//! Deterministic pseudo-embedding for tests. Never assume any geometric
//! structure from this provider (spec §9 Open Question) — it is a hash
//! stretched into a vector, not a real semantic embedding.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingOutput, EmbeddingProvider};

pub struct MockEmbeddingProvider {
    dim: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_raw(&self, text: &str) -> anyhow::Result<EmbeddingOutput> {
        let mut out = Vec::with_capacity(self.dim);
        let mut counter: u32 = 0;
        while out.len() < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() >= self.dim {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map to [-1, 1).
                let v = (bits as f64 / u32::MAX as f64) as f32 * 2.0 - 1.0;
                out.push(v);
            }
            counter += 1;
        }

        Ok(EmbeddingOutput {
            embedding: out,
            tokens_used: text.len().div_ceil(4),
        })
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
