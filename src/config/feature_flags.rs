// src/config/feature_flags.rs
//! The nine recognized feature flags from spec §6. Most govern collaborator
//! subsystems this crate treats as opaque (router, throttle, constitutional,
//! document indexing, temporal intelligence, bubble interface, guidance) —
//! they are read and stored here so a host process can thread them through,
//! but this crate has no operation of its own to gate on them. The two that
//! do gate a core operation are `enable_memory_vault` (the master switch:
//! disabled means every vault read/write returns its neutral empty result
//! instantly, per §7) and `enable_cross_project_memory` (gates
//! `queryCrossProject`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub enable_memory_vault: bool,
    pub enable_constitutional_validation: bool,
    pub enable_router_mrp: bool,
    pub enable_document_indexing: bool,
    pub enable_cross_project_memory: bool,
    pub enable_throttle: bool,
    pub enable_temporal_intelligence: bool,
    pub enable_bubble_interface: bool,
    pub enable_guidance: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_memory_vault: true,
            enable_constitutional_validation: true,
            enable_router_mrp: true,
            enable_document_indexing: true,
            enable_cross_project_memory: true,
            enable_throttle: true,
            enable_temporal_intelligence: true,
            enable_bubble_interface: true,
            enable_guidance: true,
        }
    }
}

impl FeatureFlags {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_memory_vault: env_bool("ENABLE_MEMORY_VAULT", defaults.enable_memory_vault),
            enable_constitutional_validation: env_bool(
                "ENABLE_CONSTITUTIONAL_VALIDATION",
                defaults.enable_constitutional_validation,
            ),
            enable_router_mrp: env_bool("ENABLE_ROUTER_MRP", defaults.enable_router_mrp),
            enable_document_indexing: env_bool("ENABLE_DOCUMENT_INDEXING", defaults.enable_document_indexing),
            enable_cross_project_memory: env_bool(
                "ENABLE_CROSS_PROJECT_MEMORY",
                defaults.enable_cross_project_memory,
            ),
            enable_throttle: env_bool("ENABLE_THROTTLE", defaults.enable_throttle),
            enable_temporal_intelligence: env_bool(
                "ENABLE_TEMPORAL_INTELLIGENCE",
                defaults.enable_temporal_intelligence,
            ),
            enable_bubble_interface: env_bool("ENABLE_BUBBLE_INTERFACE", defaults.enable_bubble_interface),
            enable_guidance: env_bool("ENABLE_GUIDANCE", defaults.enable_guidance),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_enabled() {
        let flags = FeatureFlags::default();
        assert!(flags.enable_memory_vault);
        assert!(flags.enable_cross_project_memory);
    }
}
