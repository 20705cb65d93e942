use chrono::{DateTime, Utc};
use progress_core::model::{ContentKey, ProgressState};

use super::SqliteRepository;
use super::mapping::{map_progress_row, sections_to_json};
use crate::repository::{CachedProgress, ProgressCacheRepository, StorageError};

#[async_trait::async_trait]
impl ProgressCacheRepository for SqliteRepository {
    async fn upsert_progress(
        &self,
        key: &ContentKey,
        progress: &ProgressState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let progress = progress.clone().normalized();
        let sections = sections_to_json(&progress.completed_sections)?;

        sqlx::query(
            r"
                INSERT INTO progress_cache (
                    content_type, content_id, progress_percentage, time_spent,
                    last_position, is_completed, completed_sections, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(content_type, content_id) DO UPDATE SET
                    progress_percentage = excluded.progress_percentage,
                    time_spent = excluded.time_spent,
                    last_position = excluded.last_position,
                    is_completed = excluded.is_completed,
                    completed_sections = excluded.completed_sections,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key.content_type.as_str())
        .bind(key.content_id.as_str())
        .bind(progress.progress_percentage)
        .bind(progress.time_spent)
        .bind(progress.last_position)
        .bind(i64::from(progress.is_completed))
        .bind(sections)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_progress(&self, key: &ContentKey) -> Result<CachedProgress, StorageError> {
        let row = sqlx::query(
            r"
                SELECT content_type, content_id, progress_percentage, time_spent,
                       last_position, is_completed, completed_sections, updated_at
                FROM progress_cache
                WHERE content_type = ?1 AND content_id = ?2
            ",
        )
        .bind(key.content_type.as_str())
        .bind(key.content_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_progress_row(&row)
    }
}
