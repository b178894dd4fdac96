// src/scheduler/mod.rs
//! Three independent periodic drivers — synthesis, utility, orphan recovery
//! — each a `tokio::time::interval` loop held as a `JoinHandle` (spec §4.9).
//! `start`/`stop` are idempotent; manual trigger functions reuse the same
//! routines the loops call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::episodic::EpisodicStore;
use crate::error::VaultResult;
use crate::semantic::SemanticStore;
use crate::synthesis::{JobPriority, SynthesisPipeline, SynthesisQueue};

pub struct SchedulerHandle {
    config: SchedulerConfig,
    queue: Arc<SynthesisQueue>,
    pipeline: Arc<SynthesisPipeline>,
    semantic: Arc<SemanticStore>,
    episodic: Arc<EpisodicStore>,
    pool: SqlitePool,
    running: AtomicBool,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerHandle {
    pub fn new(
        config: SchedulerConfig,
        queue: Arc<SynthesisQueue>,
        pipeline: Arc<SynthesisPipeline>,
        semantic: Arc<SemanticStore>,
        episodic: Arc<EpisodicStore>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            config,
            queue,
            pipeline,
            semantic,
            episodic,
            pool,
            running: AtomicBool::new(false),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// No-op if already running (spec §4.9).
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("starting vault scheduler");

        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_synthesis_loop());
        tasks.push(self.spawn_utility_loop());
        tasks.push(self.spawn_orphan_loop());
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping vault scheduler");
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn spawn_synthesis_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(this.config.synthesis_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = this.run_synthesis_tick().await {
                    warn!(%err, "synthesis tick failed");
                }
            }
        })
    }

    fn spawn_utility_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(this.config.utility_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = this.run_utility_tick().await {
                    warn!(%err, "utility tick failed");
                }
            }
        })
    }

    fn spawn_orphan_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(this.config.orphan_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = this.run_orphan_tick().await {
                    warn!(%err, "orphan-recovery tick failed");
                }
            }
        })
    }

    /// Drains up to `synthesis_batch_size` jobs from the queue.
    pub async fn run_synthesis_tick(&self) -> VaultResult<usize> {
        let results = self.pipeline.process_all(self.config.synthesis_batch_size).await?;
        Ok(results.len())
    }

    /// Daily Bayesian/decay batch pass over every memory (spec §4.10).
    pub async fn run_utility_tick(&self) -> VaultResult<usize> {
        crate::retrospective::run_batch_update(
            &self.pool,
            &self.semantic,
            crate::retrospective::UTILITY_UPDATE_WINDOW_DAYS,
        )
        .await
    }

    /// Finds conversations ended within the lookback window that never got
    /// a summary (e.g. a crashed synthesis job) and re-enqueues them at low
    /// priority (spec §4.9).
    pub async fn run_orphan_tick(&self) -> VaultResult<usize> {
        let orphans = self
            .episodic
            .find_orphaned_conversations(self.config.orphan_lookback_hours)
            .await?;
        for conversation_id in &orphans {
            self.queue
                .enqueue(conversation_id.clone(), String::new(), JobPriority::Low)
                .await;
        }
        Ok(orphans.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingService, MockEmbeddingProvider};
    use crate::episodic::DeviceType;
    use crate::synthesis::{ExtractorProvider, LlmExtractor};
    use crate::test_support::test_pool;
    use async_trait::async_trait;

    struct EmptyProvider;
    #[async_trait]
    impl ExtractorProvider for EmptyProvider {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok("{}".into())
        }
    }

    async fn handle() -> Arc<SchedulerHandle> {
        let pool = test_pool().await;
        let semantic = Arc::new(SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap());
        let episodic = Arc::new(EpisodicStore::new(pool.clone(), "u1".to_string()));
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8))));
        let extractor = Arc::new(LlmExtractor::new(Arc::new(EmptyProvider)));
        let queue = Arc::new(SynthesisQueue::new());
        let pipeline = Arc::new(SynthesisPipeline::new(
            queue.clone(),
            extractor,
            episodic.clone(),
            semantic.clone(),
            embeddings,
        ));
        Arc::new(SchedulerHandle::new(
            SchedulerConfig::default(),
            queue,
            pipeline,
            semantic,
            episodic,
            pool,
        ))
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let handle = handle().await;
        handle.start();
        handle.start();
        assert!(handle.is_running());
        assert_eq!(handle.tasks.lock().len(), 3);
        handle.stop();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn orphan_tick_enqueues_unsummarized_ended_conversations() {
        let handle = handle().await;
        let session = handle.episodic.start_session(DeviceType::Web).await.unwrap();
        let conv = handle
            .episodic
            .start_conversation(session.id.clone(), None)
            .await
            .unwrap();
        handle.episodic.end_conversation(&conv.id).await.unwrap();

        let enqueued = handle.run_orphan_tick().await.unwrap();
        assert_eq!(enqueued, 1);
        assert_eq!(handle.queue.len().await, 1);
    }

    #[tokio::test]
    async fn utility_tick_runs_without_memories() {
        let handle = handle().await;
        let updated = handle.run_utility_tick().await.unwrap();
        assert_eq!(updated, 0);
    }
}
