// src/config/privacy.rs
use serde::{Deserialize, Serialize};

/// Tunables for the privacy gate (spec §4.11); the tier/category table
/// itself is a fixed policy, not a config value, so it lives in
/// `privacy::tiers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    pub audit_log_retention_days: i64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            audit_log_retention_days: 180,
        }
    }
}
