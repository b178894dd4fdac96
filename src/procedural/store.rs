// src/procedural/store.rs
//! Mentor scripts/rules, briefing scripts, and plugin permissions
//! (spec §4.4). Version-aware writes, monotonic applied/helpful counters,
//! lazy expiry on read.

use chrono::Utc;

use super::types::*;
use crate::error::{VaultError, VaultResult};
use sqlx::SqlitePool;

pub struct ProceduralStore {
    pool: SqlitePool,
    user_id: String,
}

impl ProceduralStore {
    pub fn new(pool: SqlitePool, user_id: String) -> Self {
        Self { pool, user_id }
    }

    /// At most one script per `(user_id, project_id)` (spec §3).
    pub async fn get_or_create_script(&self, project_id: Option<String>) -> VaultResult<MentorScript> {
        if let Some(existing) = self.find_script(project_id.as_deref()).await? {
            return Ok(existing);
        }
        let script = MentorScript::new(self.user_id.clone(), project_id);
        sqlx::query(
            "INSERT INTO mentor_scripts (id, user_id, project_id, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&script.id)
        .bind(&script.user_id)
        .bind(&script.project_id)
        .bind(script.version)
        .bind(script.created_at)
        .bind(script.updated_at)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(script)
    }

    async fn find_script(&self, project_id: Option<&str>) -> VaultResult<Option<MentorScript>> {
        let row: Option<MentorScriptRow> = sqlx::query_as(
            "SELECT * FROM mentor_scripts WHERE user_id = ? AND project_id IS ?",
        )
        .bind(&self.user_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(row.map(Into::into))
    }

    /// Bumps `updated_at`; `version` only changes via `increment_version`
    /// (spec §4.4).
    pub async fn touch_script(&self, script_id: &str) -> VaultResult<()> {
        sqlx::query("UPDATE mentor_scripts SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(script_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn increment_version(&self, script_id: &str) -> VaultResult<i64> {
        let now = Utc::now();
        sqlx::query("UPDATE mentor_scripts SET version = version + 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(script_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        let version: (i64,) = sqlx::query_as("SELECT version FROM mentor_scripts WHERE id = ?")
            .bind(script_id)
            .fetch_one(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(version.0)
    }

    pub async fn add_rule(
        &self,
        script_id: &str,
        text: String,
        source: RuleSource,
        priority: i32,
    ) -> VaultResult<MentorRule> {
        let rule = MentorRule::new(script_id.to_string(), text, source, priority);
        sqlx::query(
            r#"INSERT INTO mentor_rules
               (id, script_id, text, source, priority, applied_count, helpful_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&rule.id)
        .bind(&rule.script_id)
        .bind(&rule.text)
        .bind(rule.source.as_str())
        .bind(rule.priority)
        .bind(rule.applied_count)
        .bind(rule.helpful_count)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        self.touch_script(script_id).await?;
        Ok(rule)
    }

    pub async fn rules_for_script(&self, script_id: &str) -> VaultResult<Vec<MentorRule>> {
        let rows: Vec<MentorRuleRow> = sqlx::query_as(
            "SELECT * FROM mentor_rules WHERE script_id = ? ORDER BY priority DESC",
        )
        .bind(script_id)
        .fetch_all(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn record_rule_applied(&self, rule_id: &str) -> VaultResult<()> {
        sqlx::query("UPDATE mentor_rules SET applied_count = applied_count + 1 WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    /// Rejects raising `helpful_count` above `applied_count` (spec §4.4
    /// invariant: `helpful <= applied`).
    pub async fn record_rule_helpful(&self, rule_id: &str) -> VaultResult<()> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT applied_count, helpful_count FROM mentor_rules WHERE id = ?",
        )
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(VaultError::upstream)?
        .ok_or_else(|| VaultError::not_found(format!("mentor rule {rule_id}")))?;
        let (applied, helpful) = row;
        if helpful >= applied {
            return Err(VaultError::invalid("helpful_count cannot exceed applied_count"));
        }
        sqlx::query("UPDATE mentor_rules SET helpful_count = helpful_count + 1 WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn create_briefing(
        &self,
        session_id: String,
        instructions: Vec<String>,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> VaultResult<BriefingScript> {
        let briefing = BriefingScript {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            instructions,
            expires_at,
        };
        sqlx::query(
            "INSERT INTO briefing_scripts (id, session_id, instructions_json, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&briefing.id)
        .bind(&briefing.session_id)
        .bind(serde_json::to_string(&briefing.instructions).map_err(VaultError::upstream)?)
        .bind(briefing.expires_at)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(briefing)
    }

    /// Lazy expiry: reads discard (and delete) anything past `expires_at`
    /// (spec §3/§4.4).
    pub async fn get_active_briefings(&self, session_id: &str) -> VaultResult<Vec<BriefingScript>> {
        let rows: Vec<BriefingScriptRow> = sqlx::query_as(
            "SELECT * FROM briefing_scripts WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(VaultError::upstream)?;

        let mut active = Vec::new();
        let mut expired_ids = Vec::new();
        for row in rows {
            let briefing: BriefingScript = row.into_briefing().map_err(VaultError::upstream)?;
            if briefing.is_expired() {
                expired_ids.push(briefing.id.clone());
            } else {
                active.push(briefing);
            }
        }
        for id in expired_ids {
            sqlx::query("DELETE FROM briefing_scripts WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .ok();
        }
        Ok(active)
    }

    pub async fn set_plugin_rule(&self, rule: &PluginRule) -> VaultResult<()> {
        sqlx::query(
            r#"INSERT INTO plugin_rules (plugin_id, rules_json, permissions_json, active)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(plugin_id) DO UPDATE SET
                   rules_json = excluded.rules_json,
                   permissions_json = excluded.permissions_json,
                   active = excluded.active"#,
        )
        .bind(&rule.plugin_id)
        .bind(serde_json::to_string(&rule.rules).map_err(VaultError::upstream)?)
        .bind(serde_json::to_string(&rule.permissions).map_err(VaultError::upstream)?)
        .bind(rule.active)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn get_plugin_rule(&self, plugin_id: &str) -> VaultResult<Option<PluginRule>> {
        let row: Option<PluginRuleRow> = sqlx::query_as(
            "SELECT * FROM plugin_rules WHERE plugin_id = ?",
        )
        .bind(plugin_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        row.map(|r| r.into_rule()).transpose().map_err(VaultError::upstream)
    }

    /// `write` implies `read`; `read` permits read only (spec §4.4).
    pub fn category_access(rule: &PluginRule, category: &str) -> PluginAccess {
        rule.permissions
            .iter()
            .find(|p| p.category == category)
            .map(|p| p.access)
            .unwrap_or(PluginAccess::None)
    }
}

#[derive(sqlx::FromRow)]
struct MentorScriptRow {
    id: String,
    user_id: String,
    project_id: Option<String>,
    version: i64,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<MentorScriptRow> for MentorScript {
    fn from(r: MentorScriptRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            project_id: r.project_id,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MentorRuleRow {
    id: String,
    script_id: String,
    text: String,
    source: String,
    priority: i64,
    applied_count: i64,
    helpful_count: i64,
    created_at: chrono::DateTime<Utc>,
}

impl From<MentorRuleRow> for MentorRule {
    fn from(r: MentorRuleRow) -> Self {
        Self {
            id: r.id,
            script_id: r.script_id,
            text: r.text,
            source: RuleSource::from_str(&r.source),
            priority: r.priority as i32,
            applied_count: r.applied_count,
            helpful_count: r.helpful_count,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BriefingScriptRow {
    id: String,
    session_id: String,
    instructions_json: String,
    expires_at: Option<chrono::DateTime<Utc>>,
}

impl BriefingScriptRow {
    fn into_briefing(self) -> anyhow::Result<BriefingScript> {
        Ok(BriefingScript {
            id: self.id,
            session_id: self.session_id,
            instructions: serde_json::from_str(&self.instructions_json)?,
            expires_at: self.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PluginRuleRow {
    plugin_id: String,
    rules_json: String,
    permissions_json: String,
    active: bool,
}

impl PluginRuleRow {
    fn into_rule(self) -> anyhow::Result<PluginRule> {
        Ok(PluginRule {
            plugin_id: self.plugin_id,
            rules: serde_json::from_str(&self.rules_json)?,
            permissions: serde_json::from_str(&self.permissions_json)?,
            active: self.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    async fn store() -> ProceduralStore {
        let pool = test_pool().await;
        ProceduralStore::new(pool, "u1".to_string())
    }

    #[tokio::test]
    async fn at_most_one_script_per_user_project() {
        let store = store().await;
        let a = store.get_or_create_script(None).await.unwrap();
        let b = store.get_or_create_script(None).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn increment_version_bumps_monotonically() {
        let store = store().await;
        let script = store.get_or_create_script(None).await.unwrap();
        assert_eq!(store.increment_version(&script.id).await.unwrap(), 2);
        assert_eq!(store.increment_version(&script.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn helpful_cannot_exceed_applied() {
        let store = store().await;
        let script = store.get_or_create_script(None).await.unwrap();
        let rule = store.add_rule(&script.id, "text".into(), RuleSource::UserDefined, 1).await.unwrap();

        assert!(store.record_rule_helpful(&rule.id).await.is_err());

        store.record_rule_applied(&rule.id).await.unwrap();
        store.record_rule_helpful(&rule.id).await.unwrap();
        assert!(store.record_rule_helpful(&rule.id).await.is_err());
    }

    #[tokio::test]
    async fn expired_briefings_are_dropped_on_read() {
        let store = store().await;
        let past = Utc::now() - chrono::Duration::minutes(5);
        store.create_briefing("s1".into(), vec!["a".into()], Some(past)).await.unwrap();
        store.create_briefing("s1".into(), vec!["b".into()], None).await.unwrap();

        let active = store.get_active_briefings("s1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].instructions[0], "b");
    }

    #[tokio::test]
    async fn plugin_write_implies_read() {
        let store = store().await;
        let rule = PluginRule {
            plugin_id: "p1".into(),
            rules: vec![],
            permissions: vec![PluginPermission {
                category: "preferences".into(),
                access: PluginAccess::Write,
            }],
            active: true,
        };
        store.set_plugin_rule(&rule).await.unwrap();
        let loaded = store.get_plugin_rule("p1").await.unwrap().unwrap();
        let access = ProceduralStore::category_access(&loaded, "preferences");
        assert!(access.permits_read());
        assert!(access.permits_write());
    }
}
