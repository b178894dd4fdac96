// src/retrieval/records.rs
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone)]
pub struct RetrievalRecord {
    pub id: String,
    pub memory_id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub was_helpful: Option<bool>,
}

pub async fn insert_retrieval_record(
    pool: &SqlitePool,
    memory_id: &str,
    query: &str,
) -> VaultResult<()> {
    sqlx::query(
        "INSERT INTO retrieval_records (id, memory_id, query, timestamp, was_helpful) VALUES (?, ?, ?, ?, NULL)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(memory_id)
    .bind(query)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(VaultError::upstream)?;
    Ok(())
}

/// Retrieval records for a memory within the last `days` days (feeds the
/// Bayesian utility update in spec §4.10).
pub async fn retrievals_in_window(
    pool: &SqlitePool,
    memory_id: &str,
    days: i64,
) -> VaultResult<Vec<RetrievalRecord>> {
    let cutoff = Utc::now() - chrono::Duration::days(days);
    let rows: Vec<(String, String, String, DateTime<Utc>, Option<bool>)> = sqlx::query_as(
        "SELECT id, memory_id, query, timestamp, was_helpful FROM retrieval_records WHERE memory_id = ? AND timestamp >= ?",
    )
    .bind(memory_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .map_err(VaultError::upstream)?;

    Ok(rows
        .into_iter()
        .map(|(id, memory_id, query, timestamp, was_helpful)| RetrievalRecord {
            id,
            memory_id,
            query,
            timestamp,
            was_helpful,
        })
        .collect())
}
