// src/vector_store/mod.rs
//! Record-oriented vector store abstraction for embeddings only (spec §6
//! Persistence); structured tiers live in sqlx, this is purely for
//! similarity search over embeddings. Collection naming and sanitization
//! follow spec §6 exactly so a restart or a different deployment reaches
//! the same collection.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Semantic,
    Episodic,
    Procedural,
}

impl Tier {
    fn label(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Procedural => "procedural",
        }
    }
}

/// Any char outside `[A-Za-z0-9_]` becomes `_` (spec §6).
pub fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn collection_name(prefix: &str, tier: Tier, user_id: &str) -> String {
    format!("{prefix}_{}_{}", tier.label(), sanitize_user_id(user_id))
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, tier: Tier, user_id: &str, record: VectorRecord) -> Result<()>;
    async fn search(&self, tier: Tier, user_id: &str, embedding: &[f32], limit: usize) -> Result<Vec<VectorMatch>>;
    async fn delete(&self, tier: Tier, user_id: &str, id: &str) -> Result<()>;
}

pub struct QdrantVectorStore {
    client: Qdrant,
    prefix: String,
    dimension: u64,
}

impl QdrantVectorStore {
    pub async fn new(url: &str, prefix: &str, dimension: u64) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .context("failed to connect to Qdrant")?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            dimension,
        })
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let exists = self.client.collection_exists(collection).await?;
        if exists {
            return Ok(());
        }
        info!(collection, "creating vector collection");
        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("already exists") => {
                debug!(collection, "collection created concurrently, ignoring");
                Ok(())
            }
            Err(err) => Err(err).context(format!("failed to create collection {collection}")),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, tier: Tier, user_id: &str, record: VectorRecord) -> Result<()> {
        let collection = collection_name(&self.prefix, tier, user_id);
        self.ensure_collection(&collection).await?;

        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        for (k, v) in record.payload {
            payload.insert(k, v.into());
        }

        let numeric_id: u64 = record.id.parse().unwrap_or_else(|_| {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            record.id.hash(&mut hasher);
            hasher.finish()
        });

        let point = PointStruct::new(numeric_id, record.embedding, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection, vec![point]).wait(true))
            .await
            .context("failed to upsert point")?;
        Ok(())
    }

    async fn search(&self, tier: Tier, user_id: &str, embedding: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let collection = collection_name(&self.prefix, tier, user_id);
        if !self.client.collection_exists(&collection).await? {
            return Ok(Vec::new());
        }

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&collection, embedding.to_vec(), limit as u64).with_payload(true),
            )
            .await
            .context("failed to search collection")?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let payload = point
                    .payload
                    .into_iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                    .collect();
                let id = match point.id.and_then(|i| i.point_id_options) {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                    None => String::new(),
                };
                VectorMatch {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }

    async fn delete(&self, tier: Tier, user_id: &str, id: &str) -> Result<()> {
        use qdrant_client::qdrant::DeletePointsBuilder;
        let collection = collection_name(&self.prefix, tier, user_id);
        let numeric_id: u64 = id.parse().unwrap_or_else(|_| {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            id.hash(&mut hasher);
            hasher.finish()
        });
        match self
            .client
            .delete_points(DeletePointsBuilder::new(&collection).points(vec![numeric_id.into()]))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(%err, collection, "delete failed, ignoring");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_non_alphanumeric_chars() {
        assert_eq!(sanitize_user_id("user@example.com"), "user_example_com");
        assert_eq!(sanitize_user_id("abc123_"), "abc123_");
    }

    #[test]
    fn collection_name_includes_tier_and_user() {
        let name = collection_name("osqr", Tier::Semantic, "u1");
        assert_eq!(name, "osqr_semantic_u1");
    }
}
