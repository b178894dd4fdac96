// src/privacy/audit.rs
//! Append-only access log (spec §3 AccessLogEntry, §4.11). Only
//! `prune_old_logs` may remove entries from this table — no other code path
//! issues a `DELETE` against it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterKind {
    Plugin,
    Component,
    User,
}

impl RequesterKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Component => "component",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub id: String,
    pub requester_id: String,
    pub requester_type: String,
    pub user_id: String,
    pub categories_requested: Vec<String>,
    pub categories_provided: Vec<String>,
    pub redactions_applied: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Exactly one entry per call (spec §8 invariant: "exactly one audit entry
/// is appended per `processPluginRequest` call").
pub async fn append(
    pool: &SqlitePool,
    requester_id: &str,
    requester_type: RequesterKind,
    user_id: &str,
    categories_requested: &[String],
    categories_provided: &[String],
    redactions_applied: &[String],
) -> VaultResult<String> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO access_log
           (id, requester_id, requester_type, user_id, categories_requested_json,
            categories_provided_json, redactions_applied_json, timestamp)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(requester_id)
    .bind(requester_type.as_str())
    .bind(user_id)
    .bind(serde_json::to_string(categories_requested).map_err(VaultError::upstream)?)
    .bind(serde_json::to_string(categories_provided).map_err(VaultError::upstream)?)
    .bind(serde_json::to_string(redactions_applied).map_err(VaultError::upstream)?)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(VaultError::upstream)?;
    Ok(id)
}

pub async fn for_user(pool: &SqlitePool, user_id: &str) -> VaultResult<Vec<AccessLogEntry>> {
    let rows: Vec<AccessLogRow> = sqlx::query_as(
        "SELECT * FROM access_log WHERE user_id = ? ORDER BY timestamp DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(VaultError::upstream)?;
    rows.into_iter().map(|r| r.into_entry()).collect::<anyhow::Result<_>>().map_err(VaultError::upstream)
}

/// Only code path allowed to delete audit rows (spec §4.11).
pub async fn prune_old_logs(pool: &SqlitePool, retention_days: i64) -> VaultResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let result = sqlx::query("DELETE FROM access_log WHERE timestamp < ?")
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(VaultError::upstream)?;
    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct AccessLogRow {
    id: String,
    requester_id: String,
    requester_type: String,
    user_id: String,
    categories_requested_json: String,
    categories_provided_json: String,
    redactions_applied_json: String,
    timestamp: DateTime<Utc>,
}

impl AccessLogRow {
    fn into_entry(self) -> anyhow::Result<AccessLogEntry> {
        Ok(AccessLogEntry {
            id: self.id,
            requester_id: self.requester_id,
            requester_type: self.requester_type,
            user_id: self.user_id,
            categories_requested: serde_json::from_str(&self.categories_requested_json)?,
            categories_provided: serde_json::from_str(&self.categories_provided_json)?,
            redactions_applied: serde_json::from_str(&self.redactions_applied_json)?,
            timestamp: self.timestamp,
        })
    }
}
