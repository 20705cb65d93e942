use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the client store.
///
/// Version 1 creates the bearer-token slot and the progress cache.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        // Single-row table; `id` is pinned to 1.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS auth_tokens (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    token TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress_cache (
                    content_type TEXT NOT NULL CHECK (content_type IN ('course', 'tutorial')),
                    content_id TEXT NOT NULL,
                    progress_percentage REAL NOT NULL
                        CHECK (progress_percentage >= 0 AND progress_percentage <= 100),
                    time_spent REAL NOT NULL CHECK (time_spent >= 0),
                    last_position REAL NOT NULL CHECK (last_position >= 0),
                    is_completed INTEGER NOT NULL CHECK (is_completed IN (0, 1)),
                    completed_sections TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (content_type, content_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
