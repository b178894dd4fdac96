//! Typed error surface for the vault.
//!
//! Collaborators (sqlx, reqwest, qdrant-client) return their own error
//! types; every public entry point on `Vault`/`VaultRegistry` converts those
//! into one of the categories below at the boundary (see spec §7) instead of
//! letting them escape. Internal plumbing is free to use `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("encryption error: {0}")]
    Encryption(#[from] crate::encryption::EncryptionError),

    #[error("scheduling error: {0}")]
    Scheduling(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    /// Degrade a collaborator failure (LLM/embedding provider) per §7:
    /// logged, classified, never panics.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamFailure(err.to_string())
    }
}
