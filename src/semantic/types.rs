// src/semantic/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    PersonalInfo,
    BusinessInfo,
    Relationships,
    Projects,
    Preferences,
    DomainKnowledge,
    Decisions,
    Commitments,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalInfo => "personal_info",
            Self::BusinessInfo => "business_info",
            Self::Relationships => "relationships",
            Self::Projects => "projects",
            Self::Preferences => "preferences",
            Self::DomainKnowledge => "domain_knowledge",
            Self::Decisions => "decisions",
            Self::Commitments => "commitments",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "personal_info" => Self::PersonalInfo,
            "business_info" => Self::BusinessInfo,
            "relationships" => Self::Relationships,
            "projects" => Self::Projects,
            "preferences" => Self::Preferences,
            "domain_knowledge" => Self::DomainKnowledge,
            "decisions" => Self::Decisions,
            "commitments" => Self::Commitments,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Conversation,
    ExplicitApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub topics: Vec<String>,
    pub related_memory_ids: Vec<String>,
    pub contradicts: Vec<String>,
    pub supersedes: Vec<String>,
}

impl MemoryMetadata {
    /// `update` merges metadata with set-union semantics (spec §4.2).
    pub fn merge(&mut self, other: &MemoryMetadata) {
        union_into(&mut self.topics, &other.topics);
        union_into(&mut self.related_memory_ids, &other.related_memory_ids);
        union_into(&mut self.contradicts, &other.contradicts);
        union_into(&mut self.supersedes, &other.supersedes);
    }
}

fn union_into(dest: &mut Vec<String>, src: &[String]) {
    for item in src {
        if !dest.contains(item) {
            dest.push(item.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMemory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub category: MemoryCategory,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: i64,
    pub utility_score: f32,
    pub confidence: f32,
    pub metadata: MemoryMetadata,
}

impl SemanticMemory {
    pub fn new(
        user_id: String,
        content: String,
        category: MemoryCategory,
        source: MemorySource,
        embedding: Option<Vec<f32>>,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            content,
            embedding,
            category,
            source,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            utility_score: 0.5,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: MemoryMetadata::default(),
        }
    }

    pub fn clamp_utility(&mut self) {
        self.utility_score = self.utility_score.clamp(0.0, 1.0);
    }

    /// A memory is dormant once something else supersedes it; callers must
    /// opt in with `include_superseded` to retrieve it (spec §3).
    pub fn is_superseded_by(&self, other_id: &str, edges: &[(String, String)]) -> bool {
        edges
            .iter()
            .any(|(new, old)| old == &self.id && new == other_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFilterCriteria {
    pub categories: Option<Vec<MemoryCategory>>,
    pub min_confidence: Option<f32>,
    pub min_utility: Option<f32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub include_superseded: bool,
}

#[derive(Debug, Clone)]
pub struct UtilityUpdate {
    pub memory_id: String,
    pub new_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Contradicts,
    Supersedes,
    Related,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contradicts => "contradicts",
            Self::Supersedes => "supersedes",
            Self::Related => "related",
        }
    }
}
