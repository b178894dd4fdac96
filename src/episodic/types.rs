// src/episodic/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::User,
        }
    }
}

/// Immutable once stored, except `utility_score` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tokens: usize,
    pub utility_score: Option<f32>,
}

impl Message {
    pub fn new(role: Role, content: String, timestamp: DateTime<Utc>, tokens: Option<usize>) -> Self {
        let tokens = tokens.unwrap_or_else(|| estimate_tokens(&content));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp,
            tokens,
            utility_score: None,
        }
    }
}

/// `⌈len(content)/4⌉` heuristic used wherever a caller doesn't supply a
/// token count (spec §3, reused by the retrieval budgeter per SPEC_FULL §4.6).
pub fn estimate_tokens(content: &str) -> usize {
    content.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub topics: Vec<String>,
    pub entities: Vec<String>,
    pub commitments: Vec<String>,
    pub sentiment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub metadata: ConversationMetadata,
}

impl Conversation {
    pub fn new(session_id: String, user_id: String, project_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            user_id,
            project_id,
            started_at: Utc::now(),
            ended_at: None,
            summary: None,
            metadata: ConversationMetadata::default(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Web,
    Vscode,
    Mobile,
    Voice,
    Api,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Vscode => "vscode",
            Self::Mobile => "mobile",
            Self::Voice => "voice",
            Self::Api => "api",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "vscode" => Self::Vscode,
            "mobile" => Self::Mobile,
            "voice" => Self::Voice,
            "api" => Self::Api,
            _ => Self::Web,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub device_type: DeviceType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub conversation_ids: Vec<String>,
}

impl Session {
    pub fn new(user_id: String, device_type: DeviceType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            device_type,
            started_at: Utc::now(),
            ended_at: None,
            conversation_ids: Vec::new(),
        }
    }
}
