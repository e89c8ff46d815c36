use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{CourseId, Lesson, LessonId, LessonProgress, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Minimal course row; lessons hang off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonEventKind {
    Opened,
    Completed,
}

impl LessonEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonEventKind::Opened => "opened",
            LessonEventKind::Completed => "completed",
        }
    }
}

/// One entry of the enrollment activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonEventRecord {
    pub user_id: UserId,
    pub lesson_id: LessonId,
    pub kind: LessonEventKind,
    pub occurred_at: DateTime<Utc>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Durable per-(user, lesson) completion records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fetch the record for a user and lesson, if one was ever written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup itself fails.
    async fn find(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// Insert or update a record. A completed record is never downgraded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError>;
}

/// Records lesson activity against a user's course enrollment.
#[async_trait]
pub trait EnrollmentGateway: Send + Sync {
    /// Whether the user holds an enrollment for the course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError>;

    /// Enroll a user in a course. Enrolling twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the enrollment cannot be stored.
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Note that the user opened a lesson. Callers treat this as advisory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Rejected` if the user is not enrolled in the
    /// lesson's course, or other storage errors.
    async fn open_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Record that the user completed a lesson. This is the authoritative
    /// write; local progress must not flip until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Rejected` if the user is not enrolled in the
    /// lesson's course, or other storage errors.
    async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Source of courses and their lessons.
#[async_trait]
pub trait LessonCatalog: Send + Sync {
    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StorageError>;

    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// Lessons of a course ordered by position, then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, CourseRecord>>>,
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    progress: Arc<Mutex<HashMap<(UserId, LessonId), LessonProgress>>>,
    enrollments: Arc<Mutex<HashSet<(UserId, CourseId)>>>,
    events: Arc<Mutex<Vec<LessonEventRecord>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the activity log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn events(&self) -> Result<Vec<LessonEventRecord>, StorageError> {
        Ok(self.events.lock().map_err(poisoned)?.clone())
    }

    fn course_of(&self, lesson_id: LessonId) -> Result<CourseId, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        guard
            .get(&lesson_id)
            .map(Lesson::course_id)
            .ok_or(StorageError::NotFound)
    }

    fn require_enrollment(&self, user_id: UserId, lesson_id: LessonId) -> Result<(), StorageError> {
        let course_id = self.course_of(lesson_id)?;
        let guard = self.enrollments.lock().map_err(poisoned)?;
        if guard.contains(&(user_id, course_id)) {
            Ok(())
        } else {
            Err(StorageError::Rejected(format!(
                "user {user_id} is not enrolled in course {course_id}"
            )))
        }
    }

    fn push_event(&self, event: LessonEventRecord) -> Result<(), StorageError> {
        self.events.lock().map_err(poisoned)?.push(event);
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryRepository {
    async fn find(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, lesson_id)).cloned())
    }

    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let key = (progress.user_id(), progress.lesson_id());
        let keep_existing = guard
            .get(&key)
            .is_some_and(|existing| existing.is_completed() && !progress.is_completed());
        if !keep_existing {
            guard.insert(key, progress.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentGateway for InMemoryRepository {
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError> {
        let guard = self.enrollments.lock().map_err(poisoned)?;
        Ok(guard.contains(&(user_id, course_id)))
    }

    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.enrollments
            .lock()
            .map_err(poisoned)?
            .insert((user_id, course_id));
        Ok(())
    }

    async fn open_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.require_enrollment(user_id, lesson_id)?;
        self.push_event(LessonEventRecord {
            user_id,
            lesson_id,
            kind: LessonEventKind::Opened,
            occurred_at: at,
        })
    }

    async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.require_enrollment(user_id, lesson_id)?;
        {
            let mut guard = self.progress.lock().map_err(poisoned)?;
            let entry = guard
                .entry((user_id, lesson_id))
                .or_insert_with(|| LessonProgress::not_started(user_id, lesson_id));
            *entry = entry.completed(at);
        }
        self.push_event(LessonEventRecord {
            user_id,
            lesson_id,
            kind: LessonEventKind::Completed,
            occurred_at: at,
        })
    }
}

#[async_trait]
impl LessonCatalog for InMemoryRepository {
    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StorageError> {
        self.courses
            .lock()
            .map_err(poisoned)?
            .insert(course.id, course.clone());
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        self.lessons
            .lock()
            .map_err(poisoned)?
            .insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        if !self.courses.lock().map_err(poisoned)?.contains_key(&course_id) {
            return Err(StorageError::NotFound);
        }
        let guard = self.lessons.lock().map_err(poisoned)?;
        let mut lessons: Vec<Lesson> = guard
            .values()
            .filter(|lesson| lesson.course_id() == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|lesson| (lesson.position(), lesson.id()));
        Ok(lessons)
    }
}

/// Aggregates the collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn LessonCatalog>,
    pub progress: Arc<dyn ProgressStore>,
    pub enrollments: Arc<dyn EnrollmentGateway>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    pub(crate) fn from_repository<R>(repo: R) -> Self
    where
        R: LessonCatalog + ProgressStore + EnrollmentGateway + Clone + 'static,
    {
        let catalog: Arc<dyn LessonCatalog> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressStore> = Arc::new(repo.clone());
        let enrollments: Arc<dyn EnrollmentGateway> = Arc::new(repo);
        Self {
            catalog,
            progress,
            enrollments,
        }
    }
}
