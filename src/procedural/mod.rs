// src/procedural/mod.rs
pub mod store;
pub mod types;

pub use store::ProceduralStore;
pub use types::{
    BriefingScript, MentorRule, MentorScript, PluginAccess, PluginPermission, PluginRule,
    RuleSource,
};
