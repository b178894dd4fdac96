// src/synthesis/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::semantic::MemoryCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisJob {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub priority: JobPriority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<SynthesisResult>,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic counter to keep FIFO order within a priority band stable
    /// even when enqueued within the same timestamp tick.
    pub enqueue_seq: u64,
}

impl SynthesisJob {
    pub fn new(conversation_id: String, user_id: String, priority: JobPriority, enqueue_seq: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            user_id,
            priority,
            attempts: 0,
            max_attempts: 3,
            status: JobStatus::Pending,
            last_attempt_at: None,
            error: None,
            result: None,
            enqueued_at: Utc::now(),
            enqueue_seq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionResolution {
    KeepExisting,
    ReplaceWithNew,
    KeepBoth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub content: String,
    pub category: MemoryCategory,
    pub confidence: f32,
    pub topics: Vec<String>,
    pub supersedes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub existing_memory_id: String,
    pub new_fact_index: usize,
    pub resolution: ContradictionResolution,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub facts: Vec<ExtractedFact>,
    pub summary: String,
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub conversation_id: String,
    pub created_memory_ids: Vec<String>,
    pub summary: String,
}

/// Mirrors the loose JSON the LLM actually returns before validation; a
/// record with an unrecognized `category`/`resolution` tag is dropped
/// rather than failing the whole batch (spec §9 Design Note).
#[derive(Debug, Clone, Deserialize)]
pub struct RawFact {
    pub content: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f32>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub supersedes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContradiction {
    pub existing_memory_id: Option<String>,
    pub new_fact_index: Option<usize>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub facts: Vec<RawFact>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub contradictions: Vec<RawContradiction>,
}
