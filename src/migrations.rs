// src/migrations.rs
//! Schema for the structured tiers. SQLite is the source of truth for
//! everything except embeddings, which live in the vector store (spec §6
//! Persistence). Applied idempotently with `CREATE TABLE IF NOT EXISTS` so
//! tests can share the same bootstrap as production startup.

use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS semantic_memories (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB,
        category TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_timestamp TIMESTAMP NOT NULL,
        source_confidence REAL NOT NULL,
        created_at TIMESTAMP NOT NULL,
        last_accessed_at TIMESTAMP NOT NULL,
        access_count INTEGER NOT NULL,
        utility_score REAL NOT NULL,
        confidence REAL NOT NULL,
        metadata_json TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_semantic_user ON semantic_memories(user_id)",
    r#"CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        device_type TEXT NOT NULL,
        started_at TIMESTAMP NOT NULL,
        ended_at TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        project_id TEXT,
        started_at TIMESTAMP NOT NULL,
        ended_at TIMESTAMP,
        summary TEXT,
        metadata_json TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id)",
    r#"CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL,
        tokens INTEGER NOT NULL,
        utility_score REAL,
        seq INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq)",
    r#"CREATE TABLE IF NOT EXISTS mentor_scripts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        project_id TEXT,
        version INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS mentor_rules (
        id TEXT PRIMARY KEY,
        script_id TEXT NOT NULL,
        text TEXT NOT NULL,
        source TEXT NOT NULL,
        priority INTEGER NOT NULL,
        applied_count INTEGER NOT NULL,
        helpful_count INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS briefing_scripts (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        instructions_json TEXT NOT NULL,
        expires_at TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS plugin_rules (
        plugin_id TEXT PRIMARY KEY,
        rules_json TEXT NOT NULL,
        permissions_json TEXT NOT NULL,
        active INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS access_log (
        id TEXT PRIMARY KEY,
        requester_id TEXT NOT NULL,
        requester_type TEXT NOT NULL,
        user_id TEXT NOT NULL,
        categories_requested_json TEXT NOT NULL,
        categories_provided_json TEXT NOT NULL,
        redactions_applied_json TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_access_log_user ON access_log(user_id)",
    r#"CREATE TABLE IF NOT EXISTS retrieval_records (
        id TEXT PRIMARY KEY,
        memory_id TEXT NOT NULL,
        query TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL,
        was_helpful INTEGER
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_retrieval_memory ON retrieval_records(memory_id, timestamp)",
    r#"CREATE TABLE IF NOT EXISTS outcomes (
        id TEXT PRIMARY KEY,
        memory_id TEXT NOT NULL,
        conversation_id TEXT,
        outcome TEXT NOT NULL,
        context TEXT,
        timestamp TIMESTAMP NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_outcomes_memory ON outcomes(memory_id, timestamp)",
    r#"CREATE TABLE IF NOT EXISTS memory_source_context (
        memory_id TEXT PRIMARY KEY,
        project_id TEXT,
        conversation_id TEXT,
        document_id TEXT,
        interface TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS memory_cross_references (
        id TEXT PRIMARY KEY,
        source_memory_id TEXT NOT NULL,
        target_memory_id TEXT NOT NULL,
        target_project_id TEXT,
        relationship_type TEXT NOT NULL,
        strength REAL NOT NULL,
        discovered_at TIMESTAMP NOT NULL,
        discovered_by TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS synthesis_jobs (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        priority TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        status TEXT NOT NULL,
        last_attempt_at TIMESTAMP,
        error TEXT,
        result_json TEXT,
        enqueued_at TIMESTAMP NOT NULL,
        enqueue_seq INTEGER NOT NULL
    )"#,
];

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
