// src/episodic/store.rs
//! Session/conversation/message CRUD plus metadata extraction holders
//! (spec §4.3). `add_message` only ever appends; nothing in this module
//! reorders or compacts `messages` for a live conversation — that is the
//! working-window engine's job (spec §4.5).

use chrono::Utc;
use sqlx::SqlitePool;

use super::types::*;
use crate::error::{VaultError, VaultResult};

pub struct EpisodicStore {
    pool: SqlitePool,
    user_id: String,
}

impl EpisodicStore {
    pub fn new(pool: SqlitePool, user_id: String) -> Self {
        Self { pool, user_id }
    }

    pub async fn start_session(&self, device_type: DeviceType) -> VaultResult<Session> {
        let session = Session::new(self.user_id.clone(), device_type);
        sqlx::query(
            "INSERT INTO sessions (id, user_id, device_type, started_at, ended_at) VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.device_type.as_str())
        .bind(session.started_at)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(session)
    }

    /// Ending a session does not end its conversations (spec §3).
    pub async fn end_session(&self, session_id: &str) -> VaultResult<()> {
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ? AND user_id = ?")
            .bind(Utc::now())
            .bind(session_id)
            .bind(&self.user_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn start_conversation(
        &self,
        session_id: String,
        project_id: Option<String>,
    ) -> VaultResult<Conversation> {
        let conv = Conversation::new(session_id, self.user_id.clone(), project_id);
        self.insert_conversation(&conv).await?;
        Ok(conv)
    }

    async fn insert_conversation(&self, conv: &Conversation) -> VaultResult<()> {
        sqlx::query(
            r#"INSERT INTO conversations
               (id, session_id, user_id, project_id, started_at, ended_at, summary, metadata_json)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&conv.id)
        .bind(&conv.session_id)
        .bind(&conv.user_id)
        .bind(&conv.project_id)
        .bind(conv.started_at)
        .bind(conv.ended_at)
        .bind(&conv.summary)
        .bind(serde_json::to_string(&conv.metadata).map_err(VaultError::upstream)?)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> VaultResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(&self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        row.map(|r| r.into_conversation()).transpose().map_err(VaultError::upstream)
    }

    /// `ended_at` transitions `null -> set` monotonically (spec §3); a
    /// conversation already ended is left untouched rather than erroring,
    /// matching the fail-open posture for idempotent lifecycle calls.
    pub async fn end_conversation(&self, conversation_id: &str) -> VaultResult<()> {
        sqlx::query(
            "UPDATE conversations SET ended_at = ? WHERE id = ? AND user_id = ? AND ended_at IS NULL",
        )
        .bind(Utc::now())
        .bind(conversation_id)
        .bind(&self.user_id)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }

    /// Written exactly once by the synthesis pipeline (spec §3).
    pub async fn set_summary(&self, conversation_id: &str, summary: String) -> VaultResult<()> {
        sqlx::query(
            "UPDATE conversations SET summary = ? WHERE id = ? AND user_id = ? AND summary IS NULL",
        )
        .bind(summary)
        .bind(conversation_id)
        .bind(&self.user_id)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn set_metadata(
        &self,
        conversation_id: &str,
        metadata: ConversationMetadata,
    ) -> VaultResult<()> {
        sqlx::query("UPDATE conversations SET metadata_json = ? WHERE id = ? AND user_id = ?")
            .bind(serde_json::to_string(&metadata).map_err(VaultError::upstream)?)
            .bind(conversation_id)
            .bind(&self.user_id)
            .execute(&self.pool)
            .await
            .map_err(VaultError::upstream)?;
        Ok(())
    }

    /// Appends; never inserts in the middle (spec §4.3).
    pub async fn add_message(&self, conversation_id: &str, message: &Message) -> VaultResult<()> {
        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(VaultError::upstream)?;

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, timestamp, tokens, utility_score, seq)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp)
        .bind(message.tokens as i64)
        .bind(message.utility_score)
        .bind(next_seq)
        .execute(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(())
    }

    pub async fn get_messages(&self, conversation_id: &str) -> VaultResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    /// Legacy compaction path (spec §4.3/§4.5): replaces a conversation's
    /// live message list with `kept`, having already archived `archived`.
    /// New code should rely on the working-window engine instead; this
    /// exists only so callers migrating off the old compaction API keep
    /// working.
    pub async fn archive_messages(
        &self,
        conversation_id: &str,
        archived: &[Message],
    ) -> VaultResult<()> {
        for msg in archived {
            sqlx::query(
                "INSERT INTO messages (id, conversation_id, role, content, timestamp, tokens, utility_score, seq)
                 SELECT id, conversation_id, role, content, timestamp, tokens, utility_score, seq
                 FROM messages WHERE id = ? AND conversation_id = ?
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(&msg.id)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .ok();
        }
        Ok(())
    }

    pub async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> VaultResult<()> {
        let mut tx = self.pool.begin().await.map_err(VaultError::upstream)?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(VaultError::upstream)?;
        for (seq, msg) in messages.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO messages (id, conversation_id, role, content, timestamp, tokens, utility_score, seq)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&msg.id)
            .bind(conversation_id)
            .bind(msg.role.as_str())
            .bind(&msg.content)
            .bind(msg.timestamp)
            .bind(msg.tokens as i64)
            .bind(msg.utility_score)
            .bind(seq as i64)
            .execute(&mut *tx)
            .await
            .map_err(VaultError::upstream)?;
        }
        tx.commit().await.map_err(VaultError::upstream)?;
        Ok(())
    }

    /// Sorted by timestamp desc; only conversations with a non-empty
    /// summary participate (spec §4.3).
    pub async fn get_recent_summaries(&self, limit: i64) -> VaultResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT id, summary FROM conversations
               WHERE user_id = ? AND summary IS NOT NULL AND summary != ''
               ORDER BY started_at DESC LIMIT ?"#,
        )
        .bind(&self.user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(rows)
    }

    /// Conversations whose `ended_at` falls within the last `hours` hours
    /// and whose `summary` is still empty — feeds the orphan-recovery
    /// driver (spec §4.9).
    pub async fn find_orphaned_conversations(&self, hours: i64) -> VaultResult<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM conversations
               WHERE user_id = ? AND ended_at IS NOT NULL AND ended_at >= ?
               AND (summary IS NULL OR summary = '')"#,
        )
        .bind(&self.user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(VaultError::upstream)?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    session_id: String,
    user_id: String,
    project_id: Option<String>,
    started_at: chrono::DateTime<Utc>,
    ended_at: Option<chrono::DateTime<Utc>>,
    summary: Option<String>,
    metadata_json: String,
}

impl ConversationRow {
    fn into_conversation(self) -> anyhow::Result<Conversation> {
        Ok(Conversation {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            project_id: self.project_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            summary: self.summary,
            metadata: serde_json::from_str(&self.metadata_json)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    #[allow(dead_code)]
    conversation_id: String,
    role: String,
    content: String,
    timestamp: chrono::DateTime<Utc>,
    tokens: i64,
    utility_score: Option<f32>,
    #[allow(dead_code)]
    seq: i64,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            role: Role::from_str(&self.role),
            content: self.content,
            timestamp: self.timestamp,
            tokens: self.tokens as usize,
            utility_score: self.utility_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    #[tokio::test]
    async fn messages_append_in_order() {
        let pool = test_pool().await;
        let store = EpisodicStore::new(pool, "u1".to_string());
        let session = store.start_session(DeviceType::Web).await.unwrap();
        let conv = store
            .start_conversation(session.id.clone(), None)
            .await
            .unwrap();

        for i in 0..5 {
            let msg = Message::new(Role::User, format!("msg {i}"), Utc::now(), None);
            store.add_message(&conv.id, &msg).await.unwrap();
        }

        let history = store.get_messages(&conv.id).await.unwrap();
        assert_eq!(history.len(), 5);
        for (i, m) in history.iter().enumerate() {
            assert_eq!(m.content, format!("msg {i}"));
        }
    }

    #[tokio::test]
    async fn end_conversation_is_monotonic() {
        let pool = test_pool().await;
        let store = EpisodicStore::new(pool, "u1".to_string());
        let session = store.start_session(DeviceType::Web).await.unwrap();
        let conv = store
            .start_conversation(session.id.clone(), None)
            .await
            .unwrap();
        store.end_conversation(&conv.id).await.unwrap();
        let first_end = store.get_conversation(&conv.id).await.unwrap().unwrap().ended_at;
        store.end_conversation(&conv.id).await.unwrap();
        let second_end = store.get_conversation(&conv.id).await.unwrap().unwrap().ended_at;
        assert_eq!(first_end, second_end);
    }

    #[tokio::test]
    async fn summary_written_once() {
        let pool = test_pool().await;
        let store = EpisodicStore::new(pool, "u1".to_string());
        let session = store.start_session(DeviceType::Web).await.unwrap();
        let conv = store
            .start_conversation(session.id.clone(), None)
            .await
            .unwrap();
        store.set_summary(&conv.id, "first".into()).await.unwrap();
        store.set_summary(&conv.id, "second".into()).await.unwrap();
        let loaded = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.summary.unwrap(), "first");
    }
}
