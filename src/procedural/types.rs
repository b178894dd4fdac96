// src/procedural/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    UserDefined,
    Inferred,
    Plugin,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserDefined => "user_defined",
            Self::Inferred => "inferred",
            Self::Plugin => "plugin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "inferred" => Self::Inferred,
            "plugin" => Self::Plugin,
            _ => Self::UserDefined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorRule {
    pub id: String,
    pub script_id: String,
    pub text: String,
    pub source: RuleSource,
    pub priority: i32,
    pub applied_count: i64,
    pub helpful_count: i64,
    pub created_at: DateTime<Utc>,
}

impl MentorRule {
    pub fn new(script_id: String, text: String, source: RuleSource, priority: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            script_id,
            text,
            source,
            priority,
            applied_count: 0,
            helpful_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorScript {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MentorScript {
    pub fn new(user_id: String, project_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            project_id,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingScript {
    pub id: String,
    pub session_id: String,
    pub instructions: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BriefingScript {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| t <= Utc::now()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginAccess {
    Read,
    Write,
    None,
}

impl PluginAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "read" => Self::Read,
            "write" => Self::Write,
            _ => Self::None,
        }
    }

    pub fn permits_read(&self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }

    pub fn permits_write(&self) -> bool {
        matches!(self, Self::Write)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginPermission {
    pub category: String,
    pub access: PluginAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRule {
    pub plugin_id: String,
    pub rules: Vec<String>,
    pub permissions: Vec<PluginPermission>,
    pub active: bool,
}
