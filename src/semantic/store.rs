// src/semantic/store.rs
//! Long-term facts with embeddings, utility, and the contradiction/
//! supersession graph (spec §4.2). One `SemanticStore` is constructed per
//! user; the hot in-memory map gives O(1) `record_access` while every
//! mutation flushes through to sqlx so a restart reloads the same state.

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::types::*;
use crate::error::{VaultError, VaultResult};

pub struct SemanticStore {
    pool: SqlitePool,
    user_id: String,
    hot: RwLock<HashMap<String, SemanticMemory>>,
}

impl SemanticStore {
    pub async fn load(pool: SqlitePool, user_id: String) -> VaultResult<Self> {
        let rows = sqlx::query_as::<_, SemanticMemoryRow>(
            "SELECT * FROM semantic_memories WHERE user_id = ?",
        )
        .bind(&user_id)
        .fetch_all(&pool)
        .await
        .map_err(VaultError::upstream)?;

        let mut hot = HashMap::new();
        for row in rows {
            let mem = row.into_memory().map_err(VaultError::upstream)?;
            hot.insert(mem.id.clone(), mem);
        }

        Ok(Self {
            pool,
            user_id,
            hot: RwLock::new(hot),
        })
    }

    pub async fn create(
        &self,
        content: String,
        category: MemoryCategory,
        source: MemorySource,
        embedding: Option<Vec<f32>>,
        confidence: f32,
    ) -> VaultResult<SemanticMemory> {
        if content.trim().is_empty() {
            return Err(VaultError::invalid("memory content must not be empty"));
        }
        let mem = SemanticMemory::new(
            self.user_id.clone(),
            content,
            category,
            source,
            embedding,
            confidence,
        );
        self.persist(&mem).await?;
        self.hot.write().insert(mem.id.clone(), mem.clone());
        Ok(mem)
    }

    pub fn get(&self, id: &str) -> Option<SemanticMemory> {
        self.hot.read().get(id).cloned()
    }

    pub async fn update(&self, id: &str, metadata: MemoryMetadata) -> VaultResult<SemanticMemory> {
        let mut updated = {
            let mut hot = self.hot.write();
            let mem = hot
                .get_mut(id)
                .ok_or_else(|| VaultError::not_found(format!("memory {id}")))?;
            mem.metadata.merge(&metadata);
            mem.clone()
        };
        updated.clamp_utility();
        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Drops the hot map without touching sqlx; used after a caller has
    /// already deleted the backing rows directly (spec §4.14 GDPR purge).
    pub fn delete_all_in_memory(&self) {
        self.hot.write().clear();
    }

    pub async fn delete(&self, id: &str) -> VaultResult<()> {
        self.hot.write().remove(id);
        sqlx::query("DELETE FROM semantic_memories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(&self.user_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    /// O(1): bumps `access_count`/`last_accessed_at` in the hot map; the
    /// sqlx flush happens but is not on the caller's critical path for
    /// correctness of the in-memory read.
    pub async fn record_access(&self, id: &str) -> VaultResult<()> {
        let now = Utc::now();
        let snapshot = {
            let mut hot = self.hot.write();
            let mem = hot
                .get_mut(id)
                .ok_or_else(|| VaultError::not_found(format!("memory {id}")))?;
            mem.access_count += 1;
            mem.last_accessed_at = now;
            mem.clone()
        };
        self.persist(&snapshot).await
    }

    pub fn filter(&self, criteria: &MemoryFilterCriteria) -> Vec<SemanticMemory> {
        let superseded = self.superseded_ids();
        self.hot
            .read()
            .values()
            .filter(|m| {
                if !criteria.include_superseded && superseded.contains(&m.id) {
                    return false;
                }
                if let Some(cats) = &criteria.categories {
                    if !cats.contains(&m.category) {
                        return false;
                    }
                }
                if let Some(floor) = criteria.min_confidence {
                    if m.confidence < floor {
                        return false;
                    }
                }
                if let Some(floor) = criteria.min_utility {
                    if m.utility_score < floor {
                        return false;
                    }
                }
                if let Some(after) = criteria.created_after {
                    if m.created_at < after {
                        return false;
                    }
                }
                if let Some(before) = criteria.created_before {
                    if m.created_at > before {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    /// All memory ids that are the "old" side of a `supersedes` edge.
    fn superseded_ids(&self) -> std::collections::HashSet<String> {
        self.hot
            .read()
            .values()
            .flat_map(|m| m.metadata.supersedes.clone())
            .collect()
    }

    pub async fn batch_update_utility(&self, updates: &[UtilityUpdate]) -> VaultResult<()> {
        let snapshots: Vec<SemanticMemory> = {
            let mut hot = self.hot.write();
            let mut out = Vec::with_capacity(updates.len());
            for u in updates {
                if let Some(mem) = hot.get_mut(&u.memory_id) {
                    mem.utility_score = u.new_score.clamp(0.0, 1.0);
                    out.push(mem.clone());
                }
            }
            out
        };
        for mem in &snapshots {
            self.persist(mem).await?;
        }
        Ok(())
    }

    /// `score <- score * (1 - rate)`, clamped to the floor, applied to
    /// every memory for this user (spec §4.2).
    pub async fn apply_utility_decay(&self, rate: f32, floor: f32) -> VaultResult<()> {
        let snapshots: Vec<SemanticMemory> = {
            let mut hot = self.hot.write();
            hot.values_mut()
                .map(|mem| {
                    mem.utility_score = (mem.utility_score * (1.0 - rate)).max(floor).min(1.0);
                    mem.clone()
                })
                .collect()
        };
        for mem in &snapshots {
            self.persist(mem).await?;
        }
        Ok(())
    }

    /// Idempotent, rejects self-reference. A `contradicts` edge is
    /// symmetric in effect (either side can be penalized at retrieval time)
    /// but stored once, on the newer memory, to keep the edge list
    /// canonical.
    pub async fn mark_contradiction(&self, a: &str, b: &str) -> VaultResult<()> {
        if a == b {
            return Err(VaultError::invalid("a memory cannot contradict itself"));
        }
        self.require_exists(a)?;
        self.require_exists(b)?;

        let snapshot = {
            let mut hot = self.hot.write();
            let mem = hot.get_mut(a).expect("checked above");
            if !mem.metadata.contradicts.contains(&b.to_string()) {
                mem.metadata.contradicts.push(b.to_string());
            }
            mem.clone()
        };
        self.persist(&snapshot).await
    }

    /// Idempotent, rejects self-reference and cycle-creating edges so the
    /// supersession graph stays a DAG (spec §3, §8 invariant 4).
    pub async fn mark_supersession(&self, new_id: &str, old_id: &str) -> VaultResult<()> {
        if new_id == old_id {
            return Err(VaultError::invalid("a memory cannot supersede itself"));
        }
        self.require_exists(new_id)?;
        self.require_exists(old_id)?;

        if self.would_create_cycle(new_id, old_id) {
            return Err(VaultError::invalid(
                "supersession edge would create a cycle",
            ));
        }

        let snapshot = {
            let mut hot = self.hot.write();
            let mem = hot.get_mut(new_id).expect("checked above");
            if !mem.metadata.supersedes.contains(&old_id.to_string()) {
                mem.metadata.supersedes.push(old_id.to_string());
            }
            mem.clone()
        };
        self.persist(&snapshot).await
    }

    /// Symmetric relation insert.
    pub async fn link(&self, a: &str, b: &str) -> VaultResult<()> {
        if a == b {
            return Err(VaultError::invalid("a memory cannot be related to itself"));
        }
        self.require_exists(a)?;
        self.require_exists(b)?;

        let (snap_a, snap_b) = {
            let mut hot = self.hot.write();
            {
                let mem = hot.get_mut(a).expect("checked above");
                if !mem.metadata.related_memory_ids.contains(&b.to_string()) {
                    mem.metadata.related_memory_ids.push(b.to_string());
                }
            }
            {
                let mem = hot.get_mut(b).expect("checked above");
                if !mem.metadata.related_memory_ids.contains(&a.to_string()) {
                    mem.metadata.related_memory_ids.push(a.to_string());
                }
            }
            (hot.get(a).unwrap().clone(), hot.get(b).unwrap().clone())
        };
        self.persist(&snap_a).await?;
        self.persist(&snap_b).await
    }

    fn require_exists(&self, id: &str) -> VaultResult<()> {
        if self.hot.read().contains_key(id) {
            Ok(())
        } else {
            Err(VaultError::not_found(format!("memory {id}")))
        }
    }

    /// Would adding `new_id supersedes old_id` close a cycle? True if
    /// `old_id` can already reach `new_id` by following `supersedes` edges
    /// forward (old -> whatever it supersedes -> ... -> new_id).
    fn would_create_cycle(&self, new_id: &str, old_id: &str) -> bool {
        let hot = self.hot.read();
        let mut stack = vec![old_id.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == new_id {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(mem) = hot.get(&current) {
                stack.extend(mem.metadata.supersedes.iter().cloned());
            }
        }
        false
    }

    async fn persist(&self, mem: &SemanticMemory) -> VaultResult<()> {
        let row = SemanticMemoryRow::from_memory(mem).map_err(VaultError::upstream)?;
        sqlx::query(
            r#"
            INSERT INTO semantic_memories (
                id, user_id, content, embedding, category, source_type, source_id,
                source_timestamp, source_confidence, created_at, last_accessed_at,
                access_count, utility_score, confidence, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                category = excluded.category,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                utility_score = excluded.utility_score,
                confidence = excluded.confidence,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.content)
        .bind(&row.embedding)
        .bind(&row.category)
        .bind(&row.source_type)
        .bind(&row.source_id)
        .bind(row.source_timestamp)
        .bind(row.source_confidence)
        .bind(row.created_at)
        .bind(row.last_accessed_at)
        .bind(row.access_count)
        .bind(row.utility_score)
        .bind(row.confidence)
        .bind(&row.metadata_json)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct SemanticMemoryRow {
    id: String,
    user_id: String,
    content: String,
    embedding: Option<Vec<u8>>,
    category: String,
    source_type: String,
    source_id: String,
    source_timestamp: chrono::DateTime<Utc>,
    source_confidence: f32,
    created_at: chrono::DateTime<Utc>,
    last_accessed_at: chrono::DateTime<Utc>,
    access_count: i64,
    utility_score: f32,
    confidence: f32,
    metadata_json: String,
}

impl SemanticMemoryRow {
    fn from_memory(mem: &SemanticMemory) -> anyhow::Result<Self> {
        Ok(Self {
            id: mem.id.clone(),
            user_id: mem.user_id.clone(),
            content: mem.content.clone(),
            embedding: mem
                .embedding
                .as_ref()
                .map(|e| bincode_embedding(e)),
            category: mem.category.as_str().to_string(),
            source_type: match mem.source.source_type {
                SourceType::Conversation => "conversation".to_string(),
                SourceType::ExplicitApi => "explicit_api".to_string(),
            },
            source_id: mem.source.source_id.clone(),
            source_timestamp: mem.source.timestamp,
            source_confidence: mem.source.confidence,
            created_at: mem.created_at,
            last_accessed_at: mem.last_accessed_at,
            access_count: mem.access_count,
            utility_score: mem.utility_score,
            confidence: mem.confidence,
            metadata_json: serde_json::to_string(&mem.metadata)?,
        })
    }

    fn into_memory(self) -> anyhow::Result<SemanticMemory> {
        let category = MemoryCategory::from_str(&self.category)
            .ok_or_else(|| anyhow::anyhow!("unknown category: {}", self.category))?;
        let source_type = match self.source_type.as_str() {
            "conversation" => SourceType::Conversation,
            _ => SourceType::ExplicitApi,
        };
        let metadata: MemoryMetadata = serde_json::from_str(&self.metadata_json)?;
        Ok(SemanticMemory {
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            embedding: self.embedding.map(|b| unbincode_embedding(&b)),
            category,
            source: MemorySource {
                source_type,
                source_id: self.source_id,
                timestamp: self.source_timestamp,
                confidence: self.source_confidence,
            },
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            utility_score: self.utility_score,
            confidence: self.confidence,
            metadata,
        })
    }
}

fn bincode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn unbincode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    async fn make_store() -> SemanticStore {
        let pool = test_pool().await;
        SemanticStore::load(pool, "u1".to_string()).await.unwrap()
    }

    fn src() -> MemorySource {
        MemorySource {
            source_type: SourceType::ExplicitApi,
            source_id: "test".to_string(),
            timestamp: Utc::now(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn create_sets_defaults() {
        let store = make_store().await;
        let mem = store
            .create(
                "likes dark mode".into(),
                MemoryCategory::Preferences,
                src(),
                None,
                0.8,
            )
            .await
            .unwrap();
        assert_eq!(mem.utility_score, 0.5);
        assert_eq!(mem.access_count, 0);
        assert!(mem.metadata.topics.is_empty());
    }

    #[tokio::test]
    async fn supersession_rejects_cycles() {
        let store = make_store().await;
        let a = store
            .create("a".into(), MemoryCategory::Projects, src(), None, 0.8)
            .await
            .unwrap();
        let b = store
            .create("b".into(), MemoryCategory::Projects, src(), None, 0.8)
            .await
            .unwrap();

        store.mark_supersession(&b.id, &a.id).await.unwrap();
        let err = store.mark_supersession(&a.id, &b.id).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn supersession_rejects_self_reference() {
        let store = make_store().await;
        let a = store
            .create("a".into(), MemoryCategory::Projects, src(), None, 0.8)
            .await
            .unwrap();
        assert!(store.mark_supersession(&a.id, &a.id).await.is_err());
    }

    #[tokio::test]
    async fn record_access_is_monotonic() {
        let store = make_store().await;
        let mem = store
            .create("a".into(), MemoryCategory::Projects, src(), None, 0.8)
            .await
            .unwrap();
        store.record_access(&mem.id).await.unwrap();
        store.record_access(&mem.id).await.unwrap();
        let updated = store.get(&mem.id).unwrap();
        assert_eq!(updated.access_count, 2);
    }

    #[tokio::test]
    async fn batch_update_clamps() {
        let store = make_store().await;
        let mem = store
            .create("a".into(), MemoryCategory::Projects, src(), None, 0.8)
            .await
            .unwrap();
        store
            .batch_update_utility(&[UtilityUpdate {
                memory_id: mem.id.clone(),
                new_score: 5.0,
            }])
            .await
            .unwrap();
        assert_eq!(store.get(&mem.id).unwrap().utility_score, 1.0);
    }
}
