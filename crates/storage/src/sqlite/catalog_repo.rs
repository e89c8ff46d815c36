use async_trait::async_trait;
use lesson_core::model::{CourseId, Lesson};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_lesson_row};
use crate::repository::{CourseRecord, LessonCatalog, StorageError};

#[async_trait]
impl LessonCatalog for SqliteRepository {
    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(id_i64("course_id", course.id.value())?)
        .bind(course.title.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (
                id, course_id, position, title, description,
                media_ref, duration_minutes, preview
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                position = excluded.position,
                title = excluded.title,
                description = excluded.description,
                media_ref = excluded.media_ref,
                duration_minutes = excluded.duration_minutes,
                preview = excluded.preview
            ",
        )
        .bind(id_i64("lesson_id", lesson.id().value())?)
        .bind(id_i64("course_id", lesson.course_id().value())?)
        .bind(i64::from(lesson.position()))
        .bind(lesson.title())
        .bind(lesson.description())
        .bind(lesson.media().map(ToString::to_string))
        .bind(lesson.duration_minutes().map(i64::from))
        .bind(lesson.is_preview())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let course = id_i64("course_id", course_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(course)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query(
            r"
            SELECT
                id, course_id, position, title, description,
                media_ref, duration_minutes, preview
            FROM lessons
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_lesson_row).collect()
    }
}
