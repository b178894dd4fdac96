// src/config/mod.rs
// Central configuration for the vault, composed of domain sub-configs.

pub mod feature_flags;
pub mod privacy;
pub mod retrieval;
pub mod scheduler;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use feature_flags::FeatureFlags;
pub use privacy::PrivacyConfig;
pub use retrieval::RetrievalConfig;
pub use scheduler::SchedulerConfig;

pub static CONFIG: Lazy<VaultConfig> = Lazy::new(VaultConfig::from_env);

/// Top-level configuration, assembled from the environment with sane
/// defaults so the crate runs out of the box in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub database: DatabaseConfig,
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub scheduler: SchedulerConfig,
    pub privacy: PrivacyConfig,
    pub encryption: EncryptionConfig,
    pub feature_flags: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}

/// The extraction LLM collaborator (spec §4.8) is opaque text->JSON; these
/// are just the HTTP coordinates, kept separate from `EmbeddingConfig` since
/// a deployment may point them at different providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub enabled: bool,
    /// Root key material, hex-encoded. In production this is pulled from a
    /// secrets manager; the env var is a development convenience.
    pub root_key_hex: Option<String>,
}

impl VaultConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite::memory:".to_string()),
                max_connections: std::env::var("SQLITE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8),
            },
            qdrant: QdrantConfig {
                url: std::env::var("QDRANT_URL")
                    .unwrap_or_else(|_| "http://localhost:6334".to_string()),
                collection_prefix: std::env::var("QDRANT_COLLECTION_PREFIX")
                    .unwrap_or_else(|_| "osqr".to_string()),
            },
            embedding: EmbeddingConfig {
                dimension: std::env::var("EMBEDDING_DIM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1536),
                model: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-large".to_string()),
                api_base: std::env::var("EMBEDDING_API_BASE").ok(),
                api_key: std::env::var("EMBEDDING_API_KEY").ok(),
            },
            llm: LlmConfig {
                api_base: std::env::var("LLM_API_BASE").ok(),
                api_key: std::env::var("LLM_API_KEY").ok(),
                model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            },
            retrieval: RetrievalConfig::default(),
            scheduler: SchedulerConfig::default(),
            privacy: PrivacyConfig::default(),
            encryption: EncryptionConfig {
                enabled: std::env::var("ENCRYPTION_ENABLED")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                root_key_hex: std::env::var("ENCRYPTION_ROOT_KEY").ok(),
            },
            feature_flags: FeatureFlags::from_env(),
        }
    }

    /// Eager validation at startup; collaborators must not see a
    /// half-configured vault.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding dimension must be non-zero");
        }
        if self.encryption.enabled && self.encryption.root_key_hex.is_none() {
            anyhow::bail!("ENCRYPTION_ROOT_KEY must be set when encryption is enabled");
        }
        Ok(())
    }
}
