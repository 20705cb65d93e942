use progress_core::model::{ContentKey, ContentType, ProgressState, SectionId};
use sqlx::Row;

use crate::repository::{CachedProgress, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn parse_content_type(s: &str) -> Result<ContentType, StorageError> {
    s.parse::<ContentType>()
        .map_err(|_| StorageError::Serialization(format!("invalid content type: {s}")))
}

pub(crate) fn sections_to_json(sections: &[SectionId]) -> Result<String, StorageError> {
    serde_json::to_string(sections).map_err(ser)
}

pub(crate) fn sections_from_json(raw: &str) -> Result<Vec<SectionId>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<CachedProgress, StorageError> {
    let content_type: String = row.try_get("content_type").map_err(ser)?;
    let content_id: String = row.try_get("content_id").map_err(ser)?;
    let key = ContentKey::new(parse_content_type(&content_type)?, content_id);

    let is_completed: i64 = row.try_get("is_completed").map_err(ser)?;
    let sections_raw: String = row.try_get("completed_sections").map_err(ser)?;

    let progress = ProgressState::from_persisted(
        row.try_get("progress_percentage").map_err(ser)?,
        row.try_get("time_spent").map_err(ser)?,
        row.try_get("last_position").map_err(ser)?,
        is_completed != 0,
        sections_from_json(&sections_raw)?,
    )
    .map_err(ser)?;

    Ok(CachedProgress {
        key,
        progress,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}
