use lesson_core::model::{CourseId, Lesson, LessonDraft, LessonId, LessonProgress, MediaRef, UserId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_lesson_row(row: &sqlx::sqlite::SqliteRow) -> Result<Lesson, StorageError> {
    let id = LessonId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    let course_id = CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?);
    let position = u32_from_i64("position", row.try_get("position").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let description: String = row.try_get("description").map_err(ser)?;
    let media_ref: Option<String> = row.try_get("media_ref").map_err(ser)?;
    let duration: Option<i64> = row.try_get("duration_minutes").map_err(ser)?;
    let preview: bool = row.try_get("preview").map_err(ser)?;

    let mut draft = LessonDraft::new(position, title)
        .with_description(description)
        .preview(preview);
    if let Some(raw) = media_ref {
        draft = draft.with_media(MediaRef::parse(raw).map_err(ser)?);
    }
    if let Some(minutes) = duration {
        draft = draft.with_duration_minutes(u32_from_i64("duration_minutes", minutes)?);
    }

    draft.validate(id, course_id).map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonProgress, StorageError> {
    let user_id = UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?);
    let lesson_id = LessonId::new(i64_to_u64("lesson_id", row.try_get("lesson_id").map_err(ser)?)?);
    let completed: bool = row.try_get("completed").map_err(ser)?;
    let completed_at = row.try_get("completed_at").map_err(ser)?;
    Ok(LessonProgress::from_persisted(
        user_id,
        lesson_id,
        completed,
        completed_at,
    ))
}
