// src/test_support.rs
//! Shared test bootstrap: an in-memory SQLite pool with the schema applied.
//! Kept in the library (not `tests/`) so unit tests in every module can use
//! it without duplicating the connection dance.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    crate::migrations::run_migrations(&pool)
        .await
        .expect("run migrations");
    pool
}
