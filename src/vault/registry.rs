// src/vault/registry.rs
//! Owns one `Vault` per active user, constructed lazily on first access
//! (spec §6 Vault lifecycle: `getVault`/`initializeVault`/`shutdownVault`).

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::VaultConfig;
use crate::error::VaultResult;

use super::Vault;

pub struct VaultRegistry {
    pool: SqlitePool,
    config: VaultConfig,
    vaults: RwLock<HashMap<String, Arc<Vault>>>,
}

impl VaultRegistry {
    pub fn new(pool: SqlitePool, config: VaultConfig) -> Self {
        Self {
            pool,
            config,
            vaults: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached vault for `user_id`, loading and caching it on
    /// first access. Does not start the scheduler — callers opt a user's
    /// vault into the periodic drivers explicitly.
    pub async fn get_vault(&self, user_id: &str) -> VaultResult<Arc<Vault>> {
        if let Some(vault) = self.vaults.read().await.get(user_id) {
            return Ok(vault.clone());
        }

        let mut vaults = self.vaults.write().await;
        if let Some(vault) = vaults.get(user_id) {
            return Ok(vault.clone());
        }

        info!(user_id, "initializing vault");
        let vault = Vault::load(self.pool.clone(), user_id.to_string(), self.config.clone()).await?;
        vaults.insert(user_id.to_string(), vault.clone());
        Ok(vault)
    }

    /// Explicit init, for callers (e.g. a login handler) that want to pay
    /// the load cost and start the scheduler eagerly rather than on first
    /// `get_vault` call.
    pub async fn initialize_vault(&self, user_id: &str) -> VaultResult<Arc<Vault>> {
        let vault = self.get_vault(user_id).await?;
        vault.scheduler.start();
        Ok(vault)
    }

    /// Stops the scheduler and drops the cached handle; the next
    /// `get_vault` call reloads from storage.
    pub async fn shutdown_vault(&self, user_id: &str) -> bool {
        if let Some(vault) = self.vaults.write().await.remove(user_id) {
            vault.scheduler.stop();
            true
        } else {
            false
        }
    }

    pub async fn shutdown_all(&self) {
        let mut vaults = self.vaults.write().await;
        for vault in vaults.values() {
            vault.scheduler.stop();
        }
        vaults.clear();
    }

    pub async fn active_user_ids(&self) -> Vec<String> {
        self.vaults.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    async fn registry() -> VaultRegistry {
        let pool = test_pool().await;
        let mut config = VaultConfig::from_env();
        config.embedding.api_base = Some("http://localhost:0".into());
        VaultRegistry::new(pool, config)
    }

    #[tokio::test]
    async fn get_vault_caches_by_user() {
        let registry = registry().await;
        let a = registry.get_vault("u1").await.unwrap();
        let b = registry.get_vault("u1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_users_get_distinct_vaults() {
        let registry = registry().await;
        let a = registry.get_vault("u1").await.unwrap();
        let b = registry.get_vault("u2").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn shutdown_removes_from_cache() {
        let registry = registry().await;
        registry.initialize_vault("u1").await.unwrap();
        assert!(registry.shutdown_vault("u1").await);
        assert_eq!(registry.active_user_ids().await.len(), 0);
    }
}
