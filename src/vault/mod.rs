// src/vault/mod.rs
//! Per-user façade: one `Vault` wires together every tier, the retrieval and
//! synthesis pipelines, and the scheduler (spec §6 external interface).
//! `VaultRegistry` (see `registry.rs`) owns one of these per active user.

pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;

use crate::config::VaultConfig;
use crate::embedding::{EmbeddingService, HttpEmbeddingProvider};
use crate::encryption::EncryptionService;
use crate::episodic::{Conversation, DeviceType, EpisodicStore, Message, Role, Session};
use crate::error::{VaultError, VaultResult};
use crate::privacy::{self, PluginDataRequest, PrivacySettings, SanitizedSummary};
use crate::procedural::{
    BriefingScript, MentorRule, MentorScript, PluginRule, ProceduralStore, RuleSource,
};
use crate::retrieval::{self, RetrievalOutcome, RetrieveOptions};
use crate::retrospective::{self, Outcome};
use crate::semantic::{MemoryCategory, MemoryFilterCriteria, MemorySource, SemanticMemory, SemanticStore, SourceType};
use crate::synthesis::{HttpExtractorProvider, JobPriority, LlmExtractor, SynthesisPipeline, SynthesisQueue};
use crate::scheduler::SchedulerHandle;
use crate::working_window::{WindowConfig, WorkingMemoryBuffer};

/// Everything needed to add a message to the live conversation and have it
/// show up correctly in both the working window and, eventually, synthesis.
pub struct Vault {
    pub user_id: String,
    pool: SqlitePool,
    config: VaultConfig,
    pub semantic: Arc<SemanticStore>,
    pub episodic: Arc<EpisodicStore>,
    pub procedural: Arc<ProceduralStore>,
    embeddings: Arc<EmbeddingService>,
    queue: Arc<SynthesisQueue>,
    pipeline: Arc<SynthesisPipeline>,
    pub scheduler: Arc<SchedulerHandle>,
    encryption: Option<Arc<EncryptionService>>,
    privacy_settings: Mutex<PrivacySettings>,
    buffers: Mutex<HashMap<String, WorkingMemoryBuffer>>,
}

impl Vault {
    /// Loads every per-user store from `pool` and wires the in-process
    /// synthesis queue/pipeline/scheduler. Does not start the scheduler —
    /// call `scheduler.start()` once the caller decides this user is active.
    pub async fn load(pool: SqlitePool, user_id: String, config: VaultConfig) -> VaultResult<Arc<Self>> {
        let semantic = Arc::new(SemanticStore::load(pool.clone(), user_id.clone()).await?);
        let episodic = Arc::new(EpisodicStore::new(pool.clone(), user_id.clone()));
        let procedural = Arc::new(ProceduralStore::new(pool.clone(), user_id.clone()));

        let embeddings = Arc::new(EmbeddingService::new(Arc::new(HttpEmbeddingProvider::new(
            config.embedding.api_base.clone().unwrap_or_default(),
            config.embedding.api_key.clone(),
            config.embedding.model.clone(),
            config.embedding.dimension,
        ))));

        let extractor = Arc::new(LlmExtractor::new(Arc::new(HttpExtractorProvider::new(
            config.llm.api_base.clone().unwrap_or_default(),
            config.llm.api_key.clone(),
            config.llm.model.clone(),
        ))));

        let queue = Arc::new(SynthesisQueue::new());
        let pipeline = Arc::new(SynthesisPipeline::new(
            queue.clone(),
            extractor,
            episodic.clone(),
            semantic.clone(),
            embeddings.clone(),
        ));
        let scheduler = Arc::new(SchedulerHandle::new(
            config.scheduler.clone(),
            queue.clone(),
            pipeline.clone(),
            semantic.clone(),
            episodic.clone(),
            pool.clone(),
        ));

        let encryption = if config.encryption.enabled {
            let root_key_hex = config
                .encryption
                .root_key_hex
                .clone()
                .ok_or_else(|| VaultError::invalid("ENCRYPTION_ROOT_KEY must be set when encryption is enabled"))?;
            Some(Arc::new(EncryptionService::new(&root_key_hex).map_err(VaultError::from)?))
        } else {
            None
        };

        Ok(Arc::new(Self {
            user_id,
            pool,
            config,
            semantic,
            episodic,
            procedural,
            embeddings,
            queue,
            pipeline,
            scheduler,
            encryption,
            privacy_settings: Mutex::new(PrivacySettings::default()),
            buffers: Mutex::new(HashMap::new()),
        }))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_encryption_enabled(&self) -> bool {
        self.encryption.is_some()
    }

    // ---- Conversation -------------------------------------------------

    pub async fn start_session(&self, device_type: DeviceType) -> VaultResult<Session> {
        let session = self.episodic.start_session(device_type).await?;
        self.buffers.lock().insert(
            session.id.clone(),
            WorkingMemoryBuffer::new(session.id.clone(), WindowConfig::default(), self.config.retrieval.max_tokens),
        );
        Ok(session)
    }

    pub async fn end_session(&self, session_id: &str) -> VaultResult<()> {
        self.episodic.end_session(session_id).await?;
        self.buffers.lock().remove(session_id);
        Ok(())
    }

    pub async fn start_conversation(&self, session_id: String, project_id: Option<String>) -> VaultResult<Conversation> {
        self.episodic.start_conversation(session_id, project_id).await
    }

    /// Ends the conversation and enqueues it for synthesis at normal
    /// priority (spec §3/§4.7) — the scheduler's periodic driver is the
    /// fallback path, not the only path.
    pub async fn end_conversation(&self, conversation_id: &str) -> VaultResult<()> {
        self.episodic.end_conversation(conversation_id).await?;
        self.queue
            .enqueue(conversation_id.to_string(), self.user_id.clone(), JobPriority::Normal)
            .await;
        Ok(())
    }

    /// Appends to episodic storage and, if a working buffer exists for this
    /// session, keeps the in-memory window in sync (spec §4.3/§4.5).
    pub async fn add_message(&self, session_id: &str, conversation_id: &str, role: Role, content: String) -> VaultResult<Message> {
        let message = Message::new(role, content, chrono::Utc::now(), None);
        self.episodic.add_message(conversation_id, &message).await?;
        if let Some(buffer) = self.buffers.lock().get_mut(session_id) {
            buffer.current_conversation_id = Some(conversation_id.to_string());
            buffer.add_message(message.clone());
        }
        Ok(message)
    }

    pub fn set_window_config(&self, session_id: &str, config: WindowConfig) {
        if let Some(buffer) = self.buffers.lock().get_mut(session_id) {
            buffer.set_window_config(config);
        }
    }

    pub fn working_window(&self, session_id: &str) -> Vec<Message> {
        self.buffers
            .lock()
            .get(session_id)
            .map(|b| b.working_window.clone())
            .unwrap_or_default()
    }

    // ---- Semantic / retrieval ------------------------------------------

    pub async fn remember(
        &self,
        content: String,
        category: MemoryCategory,
        source: MemorySource,
        confidence: f32,
    ) -> VaultResult<SemanticMemory> {
        if !self.config.feature_flags.enable_memory_vault {
            return Err(VaultError::invalid("memory vault is disabled"));
        }
        let embedding = self.embeddings.embed(&content).await.ok().map(|e| e.embedding);
        self.semantic.create(content, category, source, embedding, confidence).await
    }

    pub async fn remember_explicit(&self, content: String, category: MemoryCategory, confidence: f32) -> VaultResult<SemanticMemory> {
        self.remember(
            content,
            category,
            MemorySource {
                source_type: SourceType::ExplicitApi,
                source_id: self.user_id.clone(),
                timestamp: chrono::Utc::now(),
                confidence,
            },
            confidence,
        )
        .await
    }

    pub async fn retrieve_context(&self, query: &str, opts: &RetrieveOptions) -> VaultResult<RetrievalOutcome> {
        if !self.config.feature_flags.enable_memory_vault {
            return Ok(RetrievalOutcome::empty());
        }
        retrieval::retrieve_context(&self.pool, &self.semantic, &self.embeddings, query, opts, &self.config.retrieval).await
    }

    pub async fn search_memories(&self, query: &str, opts: &RetrieveOptions) -> VaultResult<RetrievalOutcome> {
        if !self.config.feature_flags.enable_memory_vault {
            return Ok(RetrievalOutcome::empty());
        }
        retrieval::search_memories(&self.pool, &self.semantic, &self.embeddings, query, opts, &self.config.retrieval).await
    }

    pub fn filter_memories(&self, criteria: &MemoryFilterCriteria) -> Vec<SemanticMemory> {
        self.semantic.filter(criteria)
    }

    // ---- Cross-project ------------------------------------------------

    pub async fn query_cross_project(
        &self,
        req: &crate::cross_project::CrossProjectQuery,
    ) -> VaultResult<crate::cross_project::CrossProjectResult> {
        if !self.config.feature_flags.enable_cross_project_memory {
            return Ok(crate::cross_project::CrossProjectResult {
                by_project: HashMap::new(),
                common_themes: Vec::new(),
                contradictions: Vec::new(),
                project_summaries: HashMap::new(),
            });
        }
        crate::cross_project::query_cross_project(&self.pool, &self.semantic, &self.embeddings, &self.config.retrieval, req).await
    }

    // ---- Synthesis -------------------------------------------------------

    pub async fn enqueue_synthesis(&self, conversation_id: String, priority: JobPriority) -> String {
        self.queue.enqueue(conversation_id, self.user_id.clone(), priority).await
    }

    pub async fn run_synthesis_now(&self, batch_size: usize) -> VaultResult<usize> {
        Ok(self.pipeline.process_all(batch_size).await?.len())
    }

    // ---- Retrospective / outcomes ----------------------------------------

    pub async fn record_outcome(
        &self,
        memory_id: &str,
        conversation_id: Option<&str>,
        outcome: Outcome,
        context: Option<&str>,
    ) -> VaultResult<f32> {
        retrospective::record_outcome(&self.pool, &self.semantic, memory_id, conversation_id, outcome, context).await
    }

    pub async fn run_utility_batch(&self, window_days: i64) -> VaultResult<usize> {
        retrospective::run_batch_update(&self.pool, &self.semantic, window_days).await
    }

    // ---- Procedural --------------------------------------------------

    pub async fn get_or_create_mentor_script(&self, project_id: Option<String>) -> VaultResult<MentorScript> {
        self.procedural.get_or_create_script(project_id).await
    }

    pub async fn add_mentor_rule(&self, script_id: &str, text: String, source: RuleSource, priority: i32) -> VaultResult<MentorRule> {
        self.procedural.add_rule(script_id, text, source, priority).await
    }

    pub async fn mentor_rules(&self, script_id: &str) -> VaultResult<Vec<MentorRule>> {
        self.procedural.rules_for_script(script_id).await
    }

    pub async fn create_briefing(&self, session_id: String, instructions: Vec<String>, expires_at: Option<chrono::DateTime<chrono::Utc>>) -> VaultResult<BriefingScript> {
        self.procedural.create_briefing(session_id, instructions, expires_at).await
    }

    pub async fn active_briefings(&self, session_id: &str) -> VaultResult<Vec<BriefingScript>> {
        self.procedural.get_active_briefings(session_id).await
    }

    pub async fn set_plugin_rule(&self, rule: &PluginRule) -> VaultResult<()> {
        self.procedural.set_plugin_rule(rule).await
    }

    // ---- Privacy -----------------------------------------------------

    pub fn set_privacy_settings(&self, settings: PrivacySettings) {
        *self.privacy_settings.lock() = settings;
    }

    pub fn privacy_settings(&self) -> PrivacySettings {
        *self.privacy_settings.lock()
    }

    pub async fn process_plugin_request(&self, request: &PluginDataRequest) -> VaultResult<SanitizedSummary> {
        if !self.config.feature_flags.enable_memory_vault {
            return Ok(SanitizedSummary {
                content: String::new(),
                categories: Vec::new(),
                confidence: 0.0,
                redactions_applied: Vec::new(),
            });
        }
        let settings = self.privacy_settings();
        let memories = self.semantic.filter(&MemoryFilterCriteria::default());
        privacy::process_plugin_request(&self.pool, request, &self.user_id, &settings, &memories).await
    }

    pub async fn prune_audit_log(&self) -> VaultResult<u64> {
        privacy::audit::prune_old_logs(&self.pool, self.config.privacy.audit_log_retention_days).await
    }

    // ---- Admin / GDPR --------------------------------------------------

    /// Everything this crate holds about the user, assembled for an export
    /// request (spec §4.14 Admin/GDPR). Conversations/messages/memories only
    /// — audit log entries about *this* user as the subject are included,
    /// entries where they were the requester of someone else's data are not
    /// (there are none, since requests are always scoped to one's own vault).
    pub async fn export_user_data(&self) -> VaultResult<UserDataExport> {
        let memories = self.semantic.filter(&MemoryFilterCriteria { include_superseded: true, ..Default::default() });
        let access_log = privacy::audit::for_user(&self.pool, &self.user_id).await?;
        Ok(UserDataExport {
            user_id: self.user_id.clone(),
            memories,
            access_log,
        })
    }

    /// Irreversibly deletes every structured row for this user. Vector-store
    /// cleanup is the caller's responsibility (the collection is keyed by
    /// user id; dropping it is a separate, store-specific call — spec §4.14).
    pub async fn delete_all_user_data(&self) -> VaultResult<()> {
        let mut tx = self.pool.begin().await.map_err(VaultError::upstream)?;
        for stmt in [
            "DELETE FROM semantic_memories WHERE user_id = ?",
            "DELETE FROM conversations WHERE user_id = ?",
            "DELETE FROM sessions WHERE user_id = ?",
            "DELETE FROM mentor_scripts WHERE user_id = ?",
            "DELETE FROM access_log WHERE user_id = ?",
        ] {
            sqlx::query(stmt).bind(&self.user_id).execute(&mut *tx).await.map_err(VaultError::upstream)?;
        }
        tx.commit().await.map_err(VaultError::upstream)?;
        self.semantic.delete_all_in_memory();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UserDataExport {
    pub user_id: String,
    pub memories: Vec<SemanticMemory>,
    pub access_log: Vec<privacy::audit::AccessLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::semantic::SourceType;
    use crate::test_support::test_pool;

    async fn vault() -> Arc<Vault> {
        let pool = test_pool().await;
        let mut config = VaultConfig::from_env();
        config.embedding.api_base = Some("http://localhost:0".into());
        Vault::load(pool, "u1".to_string(), config).await.unwrap()
    }

    #[tokio::test]
    async fn session_lifecycle_tracks_working_window() {
        let vault = vault().await;
        let session = vault.start_session(DeviceType::Web).await.unwrap();
        let conv = vault.start_conversation(session.id.clone(), None).await.unwrap();
        vault.add_message(&session.id, &conv.id, Role::User, "hello".into()).await.unwrap();
        assert_eq!(vault.working_window(&session.id).len(), 1);
        vault.end_session(&session.id).await.unwrap();
        assert!(vault.working_window(&session.id).is_empty());
    }

    #[tokio::test]
    async fn end_conversation_enqueues_synthesis() {
        let vault = vault().await;
        let session = vault.start_session(DeviceType::Web).await.unwrap();
        let conv = vault.start_conversation(session.id.clone(), None).await.unwrap();
        vault.end_conversation(&conv.id).await.unwrap();
        assert_eq!(vault.queue.len().await, 1);
    }

    #[tokio::test]
    async fn explicit_memory_round_trips_through_filter() {
        let vault = vault().await;
        let mem = vault
            .remember_explicit("likes dark mode".into(), MemoryCategory::Preferences, 0.9)
            .await
            .unwrap();
        let found = vault.filter_memories(&MemoryFilterCriteria::default());
        assert!(found.iter().any(|m| m.id == mem.id));
    }

    #[tokio::test]
    async fn gdpr_delete_clears_memories() {
        let vault = vault().await;
        vault.remember_explicit("x".into(), MemoryCategory::Preferences, 0.9).await.unwrap();
        vault.delete_all_user_data().await.unwrap();
        assert!(vault.filter_memories(&MemoryFilterCriteria::default()).is_empty());
    }

    #[tokio::test]
    async fn disabled_memory_vault_returns_neutral_results() {
        let pool = test_pool().await;
        let mut config = VaultConfig::from_env();
        config.embedding.api_base = Some("http://localhost:0".into());
        config.feature_flags.enable_memory_vault = false;
        let vault = Vault::load(pool, "u1".to_string(), config).await.unwrap();

        assert!(vault.remember_explicit("x".into(), MemoryCategory::Preferences, 0.9).await.is_err());
        let outcome = vault.retrieve_context("anything", &RetrieveOptions::default()).await.unwrap();
        assert!(outcome.memories.is_empty());
    }
}
