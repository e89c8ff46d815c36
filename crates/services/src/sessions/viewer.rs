use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use lesson_core::Clock;
use lesson_core::model::CourseId;
use storage::repository::{EnrollmentGateway, LessonCatalog, ProgressStore, Storage, StorageError};
use tracing::info;

use super::controller::{Access, LessonSessionController, SessionSetup};
use crate::app_services::UserSession;
use crate::error::{InvalidState, SessionError};
use crate::playback::{MediaBackend, PlaybackResourceManager};
use crate::progress_tracker::LessonProgressTracker;

/// Viewer behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerSettings {
    /// Let users who are not enrolled open a course and watch its preview lessons.
    pub allow_preview: bool,
    /// Buffered signals per subscriber before the oldest are dropped.
    pub signal_capacity: usize,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            allow_preview: true,
            signal_capacity: 16,
        }
    }
}

impl ViewerSettings {
    /// Reads `LESSONS_ALLOW_PREVIEW` (`0`/`false`/`no` disables previews).
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(raw) = env::var("LESSONS_ALLOW_PREVIEW") {
            settings.allow_preview = !matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
        settings
    }
}

/// Opens lesson viewing sessions.
#[derive(Clone)]
pub struct ViewerService {
    clock: Clock,
    settings: ViewerSettings,
    catalog: Arc<dyn LessonCatalog>,
    progress: Arc<dyn ProgressStore>,
    enrollments: Arc<dyn EnrollmentGateway>,
    backend: Arc<dyn MediaBackend>,
}

impl ViewerService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            clock,
            settings: ViewerSettings::default(),
            catalog: Arc::clone(&storage.catalog),
            progress: Arc::clone(&storage.progress),
            enrollments: Arc::clone(&storage.enrollments),
            backend,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ViewerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> ViewerSettings {
        self.settings
    }

    /// Load a course for `user` and start a session with progress loaded and
    /// no lesson selected.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CourseNotFound` for an unknown course,
    /// `SessionError::InvalidState` when the course lists a lesson twice or
    /// the user is not enrolled and previews are disabled, and
    /// `SessionError::PersistenceFailure` when storage fails.
    pub async fn open_course(
        &self,
        user: &UserSession,
        course_id: CourseId,
    ) -> Result<LessonSessionController, SessionError> {
        let lessons = match self.catalog.lessons_for_course(course_id).await {
            Ok(lessons) => lessons,
            Err(StorageError::NotFound) => return Err(SessionError::CourseNotFound(course_id)),
            Err(err) => return Err(err.into()),
        };

        let mut seen = HashSet::with_capacity(lessons.len());
        if let Some(dup) = lessons.iter().find(|lesson| !seen.insert(lesson.id())) {
            return Err(InvalidState::DuplicateLesson(dup.id()).into());
        }

        let user_id = user.user_id();
        let access = if self.enrollments.is_enrolled(user_id, course_id).await? {
            Access::Enrolled
        } else if self.settings.allow_preview {
            Access::PreviewOnly
        } else {
            return Err(InvalidState::NotEnrolled.into());
        };

        let mut tracker = LessonProgressTracker::new(
            self.clock,
            Arc::clone(&self.progress),
            Arc::clone(&self.enrollments),
        );
        tracker.load_progress(&lessons, user_id).await?;

        info!(
            user = %user_id,
            course = %course_id,
            lessons = lessons.len(),
            ?access,
            summary = %tracker.summary(),
            "course opened"
        );

        Ok(LessonSessionController::new(SessionSetup {
            user_id,
            course_id,
            access,
            lessons,
            clock: self.clock,
            gateway: Arc::clone(&self.enrollments),
            tracker,
            playback: PlaybackResourceManager::new(Arc::clone(&self.backend)),
            signal_capacity: self.settings.signal_capacity,
        }))
    }
}
