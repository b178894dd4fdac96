// src/privacy/tiers.rs
//! Fixed tier/category policy (spec §4.11) — read-only at runtime, so this
//! is plain code rather than a config value.

use crate::semantic::MemoryCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessTier {
    None,
    Minimal,
    Contextual,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterType {
    Plugin,
    Component,
    User,
}

/// Tier read-allowances, `personal_info` excluded everywhere for plugins
/// (enforced separately by the caller, not by this table, since the same
/// table is consulted for component/user requests where `personal_info`
/// *is* allowed at `full`).
pub fn allowed_categories(tier: AccessTier) -> Vec<MemoryCategory> {
    use MemoryCategory::*;
    match tier {
        AccessTier::None => vec![],
        AccessTier::Minimal => vec![Preferences],
        AccessTier::Contextual => vec![Preferences, BusinessInfo, Projects, DomainKnowledge],
        AccessTier::Full => vec![
            Preferences,
            BusinessInfo,
            Projects,
            DomainKnowledge,
            Decisions,
            Commitments,
            Relationships,
            PersonalInfo,
        ],
    }
}

/// Effective tier for a given requester (spec §4.11): components always get
/// `contextual`, users always get `full` on their own data, plugins use
/// whatever tier is on file.
pub fn effective_tier(requester: RequesterType, plugin_tier: AccessTier) -> AccessTier {
    match requester {
        RequesterType::Component => AccessTier::Contextual,
        RequesterType::User => AccessTier::Full,
        RequesterType::Plugin => plugin_tier,
    }
}

pub fn category_allowed(requester: RequesterType, tier: AccessTier, category: MemoryCategory) -> bool {
    if requester == RequesterType::Plugin && category == MemoryCategory::PersonalInfo {
        return false;
    }
    allowed_categories(effective_tier(requester, tier)).contains(&category)
}

pub fn requires_full(requester: RequesterType, tier: AccessTier) -> bool {
    effective_tier(requester, tier) == AccessTier::Full
}
