use async_trait::async_trait;
use lesson_core::model::{LessonId, LessonProgress, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_progress_row};
use crate::repository::{ProgressStore, StorageError};

#[async_trait]
impl ProgressStore for SqliteRepository {
    async fn find(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, lesson_id, completed, completed_at
            FROM lesson_progress
            WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                -- completion is monotonic; keep the earliest timestamp
                completed = MAX(lesson_progress.completed, excluded.completed),
                completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at)
            ",
        )
        .bind(id_i64("user_id", progress.user_id().value())?)
        .bind(id_i64("lesson_id", progress.lesson_id().value())?)
        .bind(progress.is_completed())
        .bind(progress.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
