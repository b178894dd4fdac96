// src/embedding/provider.rs
//! Production embedding provider: an opaque HTTP collaborator (spec §1 lists
//! the embedding provider as explicitly out of scope for the core's logic).

use async_trait::async_trait;
use serde::Deserialize;

use super::{EmbeddingOutput, EmbeddingProvider};

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(api_base: String, api_key: Option<String>, model: String, dim: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
            dim,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    tokens_used: usize,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_raw(&self, text: &str) -> anyhow::Result<EmbeddingOutput> {
        let mut req = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .json(&serde_json::json!({ "model": self.model, "input": text }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?.error_for_status()?;
        let parsed: EmbeddingResponse = resp.json().await?;
        Ok(EmbeddingOutput {
            embedding: parsed.embedding,
            tokens_used: parsed.tokens_used,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
