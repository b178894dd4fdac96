// src/privacy/mod.rs
//! Tiered plugin access, redaction, and the append-only audit log
//! (spec §4.11).

pub mod audit;
pub mod redaction;
pub mod tiers;

use sqlx::SqlitePool;

use crate::error::VaultResult;
use crate::semantic::{MemoryCategory, SemanticMemory};

pub use audit::RequesterKind;
pub use tiers::AccessTier;

#[derive(Debug, Clone)]
pub struct PluginDataRequest {
    pub plugin_id: String,
    pub requested_categories: Vec<MemoryCategory>,
    pub purpose: String,
}

#[derive(Debug, Clone)]
pub struct SanitizedSummary {
    pub content: String,
    pub categories: Vec<MemoryCategory>,
    pub confidence: f32,
    pub redactions_applied: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PrivacySettings {
    pub plugin_access_tier: AccessTier,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            plugin_access_tier: AccessTier::Minimal,
        }
    }
}

/// `processPluginRequest`: filters memories to allowed categories,
/// synthesizes a sanitized summary, logs access, and returns the summary
/// (spec §4.11). `personal_info` is dropped for plugin requesters before
/// anything else runs, regardless of tier.
pub async fn process_plugin_request(
    pool: &SqlitePool,
    request: &PluginDataRequest,
    user_id: &str,
    settings: &PrivacySettings,
    memories: &[SemanticMemory],
) -> VaultResult<SanitizedSummary> {
    let requested_names: Vec<String> = request
        .requested_categories
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();

    let allowed: Vec<&SemanticMemory> = memories
        .iter()
        .filter(|m| request.requested_categories.contains(&m.category))
        .filter(|m| tiers::category_allowed(tiers::RequesterType::Plugin, settings.plugin_access_tier, m.category))
        .collect();

    let mut rules = redaction::always_on_rules();
    rules.extend(redaction::tier_default_rules());

    let mut redactions_applied = Vec::new();
    let mut pieces = Vec::with_capacity(allowed.len());
    let mut categories_provided = Vec::new();
    let mut confidence_sum = 0.0f32;

    for mem in &allowed {
        let (redacted, applied) = redaction::redact(&mem.content, &rules);
        for name in applied {
            if !redactions_applied.contains(&name) {
                redactions_applied.push(name);
            }
        }
        pieces.push(redacted);
        if !categories_provided.contains(&mem.category) {
            categories_provided.push(mem.category);
        }
        confidence_sum += mem.confidence;
    }

    let confidence = if allowed.is_empty() {
        0.0
    } else {
        confidence_sum / allowed.len() as f32
    };

    let content = pieces.join(" ");

    audit::append(
        pool,
        &request.plugin_id,
        RequesterKind::Plugin,
        user_id,
        &requested_names,
        &categories_provided.iter().map(|c| c.as_str().to_string()).collect::<Vec<_>>(),
        &redactions_applied,
    )
    .await?;

    Ok(SanitizedSummary {
        content,
        categories: categories_provided,
        confidence,
        redactions_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{MemorySource, SourceType};
    use crate::test_support::test_pool;
    use chrono::Utc;

    fn memory(category: MemoryCategory, content: &str) -> SemanticMemory {
        SemanticMemory::new(
            "u1".into(),
            content.into(),
            category,
            MemorySource {
                source_type: SourceType::ExplicitApi,
                source_id: "t".into(),
                timestamp: Utc::now(),
                confidence: 0.9,
            },
            None,
            0.9,
        )
    }

    #[tokio::test]
    async fn personal_info_never_reaches_plugins() {
        let pool = test_pool().await;
        let request = PluginDataRequest {
            plugin_id: "p1".into(),
            requested_categories: vec![
                MemoryCategory::PersonalInfo,
                MemoryCategory::BusinessInfo,
                MemoryCategory::Preferences,
            ],
            purpose: "analytics".into(),
        };
        let settings = PrivacySettings {
            plugin_access_tier: AccessTier::Contextual,
        };
        let memories = vec![
            memory(MemoryCategory::PersonalInfo, "SSN 123-45-6789"),
            memory(MemoryCategory::BusinessInfo, "Revenue $10,000,000"),
            memory(MemoryCategory::Preferences, "likes dark mode"),
        ];

        let summary = process_plugin_request(&pool, &request, "u1", &settings, &memories)
            .await
            .unwrap();

        assert!(!summary.categories.contains(&MemoryCategory::PersonalInfo));
        assert_eq!(summary.categories.len(), 2);
        assert!(!summary.content.contains("123-45-6789"));
        assert!(summary.content.contains("[substantial financial goals]"));

        let log = audit::for_user(&pool, "u1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].categories_requested.len(), 3);
        assert_eq!(log[0].categories_provided.len(), 2);
    }

    #[tokio::test]
    async fn none_tier_blocks_everything() {
        let pool = test_pool().await;
        let request = PluginDataRequest {
            plugin_id: "p1".into(),
            requested_categories: vec![MemoryCategory::Preferences],
            purpose: "x".into(),
        };
        let settings = PrivacySettings {
            plugin_access_tier: AccessTier::None,
        };
        let memories = vec![memory(MemoryCategory::Preferences, "likes dark mode")];

        let summary = process_plugin_request(&pool, &request, "u1", &settings, &memories)
            .await
            .unwrap();
        assert!(summary.categories.is_empty());
        assert_eq!(summary.confidence, 0.0);
    }
}
