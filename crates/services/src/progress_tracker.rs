use std::collections::HashMap;
use std::sync::Arc;

use lesson_core::Clock;
use lesson_core::model::{CourseProgressSummary, Lesson, LessonId, LessonProgress, UserId};
use storage::repository::{EnrollmentGateway, ProgressStore};
use tracing::{debug, info};

use crate::error::SessionError;

/// Result of a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub lesson_id: LessonId,
    /// False when the lesson was already complete and nothing was written.
    pub newly_completed: bool,
    /// True only for the call that took the course from total - 1 to total.
    pub reached_full_course: bool,
    pub summary: CourseProgressSummary,
}

/// Owns the per-lesson progress map of one viewing session.
pub struct LessonProgressTracker {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    gateway: Arc<dyn EnrollmentGateway>,
    user_id: Option<UserId>,
    order: Vec<LessonId>,
    entries: HashMap<LessonId, LessonProgress>,
}

impl LessonProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn ProgressStore>,
        gateway: Arc<dyn EnrollmentGateway>,
    ) -> Self {
        Self {
            clock,
            store,
            gateway,
            user_id: None,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Fetch stored progress for every lesson, defaulting missing records to
    /// not-started (those defaults are not written back).
    ///
    /// Reloading keeps any completion already known locally. Nothing changes
    /// unless every lookup succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::PersistenceFailure` if a lookup fails.
    pub async fn load_progress(
        &mut self,
        lessons: &[Lesson],
        user_id: UserId,
    ) -> Result<(), SessionError> {
        let same_user = self.user_id == Some(user_id);
        let mut loaded = HashMap::with_capacity(lessons.len());
        for lesson in lessons {
            let stored = self.store.find(user_id, lesson.id()).await?;
            let mut record =
                stored.unwrap_or_else(|| LessonProgress::not_started(user_id, lesson.id()));
            if same_user {
                if let Some(local) = self.entries.get(&lesson.id()) {
                    if local.is_completed() && !record.is_completed() {
                        record = local.clone();
                    }
                }
            }
            loaded.insert(lesson.id(), record);
        }

        self.user_id = Some(user_id);
        self.order = lessons.iter().map(Lesson::id).collect();
        self.entries = loaded;
        debug!(user = %user_id, summary = %self.summary(), "progress loaded");
        Ok(())
    }

    #[must_use]
    pub fn progress_of(&self, lesson_id: LessonId) -> Option<&LessonProgress> {
        self.entries.get(&lesson_id)
    }

    #[must_use]
    pub fn is_completed(&self, lesson_id: LessonId) -> bool {
        self.entries
            .get(&lesson_id)
            .is_some_and(LessonProgress::is_completed)
    }

    /// Records in lesson order.
    pub fn records(&self) -> impl Iterator<Item = &LessonProgress> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Aggregate progress over the in-memory map.
    #[must_use]
    pub fn summary(&self) -> CourseProgressSummary {
        CourseProgressSummary::from_progress(self.entries.values())
    }

    /// Mark a lesson complete.
    ///
    /// The enrollment gateway is authoritative and records the completion in
    /// durable progress itself; the local entry flips only after it accepts
    /// the write. Completing an already-completed lesson succeeds without any
    /// external call.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for a lesson outside the session and
    /// `SessionError::PersistenceFailure` if the gateway refuses the write.
    pub async fn complete(&mut self, lesson_id: LessonId) -> Result<Completion, SessionError> {
        let (Some(user_id), Some(entry)) = (self.user_id, self.entries.get(&lesson_id)) else {
            return Err(SessionError::NotFound(lesson_id));
        };
        if entry.is_completed() {
            return Ok(Completion {
                lesson_id,
                newly_completed: false,
                reached_full_course: false,
                summary: self.summary(),
            });
        }

        let before = self.summary();
        let now = self.clock.now();
        let updated = entry.completed(now);

        self.gateway.complete_lesson(user_id, lesson_id, now).await?;

        self.entries.insert(lesson_id, updated);
        let summary = self.summary();
        info!(user = %user_id, lesson = %lesson_id, %summary, "lesson completed");

        Ok(Completion {
            lesson_id,
            newly_completed: true,
            reached_full_course: !before.is_complete() && summary.is_complete(),
            summary,
        })
    }
}
