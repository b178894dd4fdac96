// src/lib.rs
//! Per-user memory vault for a conversational assistant: episodic,
//! semantic, and procedural tiers, the retrieval and synthesis pipelines,
//! the retrospective utility loop, cross-project linking, privacy gating,
//! and the periodic scheduler that drives all of it.
//!
//! This crate has no transport layer of its own; it is meant to sit behind
//! whatever RPC/HTTP surface a host process wants to expose (spec §1).

pub mod config;
pub mod cross_project;
pub mod embedding;
pub mod encryption;
pub mod episodic;
pub mod error;
pub mod migrations;
pub mod privacy;
pub mod procedural;
pub mod retrieval;
pub mod retrospective;
pub mod scheduler;
pub mod semantic;
pub mod synthesis;
pub mod vault;
pub mod vector_store;
pub mod working_window;

pub mod test_support;

pub use error::{VaultError, VaultResult};
pub use vault::registry::VaultRegistry;
pub use vault::Vault;
