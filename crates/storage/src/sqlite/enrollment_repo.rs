use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{CourseId, LessonId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{
    EnrollmentGateway, LessonEventKind, LessonEventRecord, StorageError,
};

impl SqliteRepository {
    /// Fail unless `user_id` is enrolled in the course that owns `lesson_id`.
    async fn require_enrollment(&self, user: i64, lesson: i64) -> Result<(), StorageError> {
        let row = sqlx::query(
            r"
            SELECT e.user_id
            FROM lessons l
            LEFT JOIN enrollments e
                ON e.course_id = l.course_id AND e.user_id = ?1
            WHERE l.id = ?2
            ",
        )
        .bind(user)
        .bind(lesson)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let enrolled: Option<i64> = row.try_get("user_id").map_err(ser)?;
        if enrolled.is_none() {
            return Err(StorageError::Rejected(format!(
                "user {user} is not enrolled in the course of lesson {lesson}"
            )));
        }
        Ok(())
    }

    /// Activity log for one user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails or a row is malformed.
    pub async fn lesson_events(
        &self,
        user_id: UserId,
    ) -> Result<Vec<LessonEventRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lesson_id, kind, occurred_at
            FROM lesson_events
            WHERE user_id = ?1
            ORDER BY occurred_at ASC, id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let lesson_id: i64 = row.try_get("lesson_id").map_err(ser)?;
            let kind: String = row.try_get("kind").map_err(ser)?;
            let kind = match kind.as_str() {
                "opened" => LessonEventKind::Opened,
                "completed" => LessonEventKind::Completed,
                other => return Err(ser(format!("unknown lesson event kind: {other}"))),
            };
            out.push(LessonEventRecord {
                user_id,
                lesson_id: LessonId::new(
                    u64::try_from(lesson_id).map_err(|_| ser("lesson_id sign overflow"))?,
                ),
                kind,
                occurred_at: row.try_get("occurred_at").map_err(ser)?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl EnrollmentGateway for SqliteRepository {
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM enrollments WHERE user_id = ?1 AND course_id = ?2")
            .bind(id_i64("user_id", user_id.value())?)
            .bind(id_i64("course_id", course_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (user_id, course_id, enrolled_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn open_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let lesson = id_i64("lesson_id", lesson_id.value())?;
        self.require_enrollment(user, lesson).await?;

        sqlx::query(
            r"
            INSERT INTO lesson_events (user_id, lesson_id, kind, occurred_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user)
        .bind(lesson)
        .bind(LessonEventKind::Opened.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let lesson = id_i64("lesson_id", lesson_id.value())?;
        self.require_enrollment(user, lesson).await?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                completed = 1,
                completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at)
            ",
        )
        .bind(user)
        .bind(lesson)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        sqlx::query(
            r"
            INSERT INTO lesson_events (user_id, lesson_id, kind, occurred_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user)
        .bind(lesson)
        .bind(LessonEventKind::Completed.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
