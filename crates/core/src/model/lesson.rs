use thiserror::Error;

use crate::model::ids::{CourseId, LessonId};
use crate::model::media::MediaRef;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("lesson duration must be > 0 minutes when set")]
    InvalidDuration,
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// An ordered unit of content within a course.
///
/// Lessons are immutable once loaded into a viewing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    position: u32,
    title: String,
    description: String,
    media: Option<MediaRef>,
    duration_minutes: Option<u32>,
    preview: bool,
}

impl Lesson {
    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Ordinal position within the course, ascending.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    #[must_use]
    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
    }

    /// Whether the lesson can be watched without an enrollment.
    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.preview
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated lesson fields as they arrive from the catalog.
#[derive(Debug, Clone, Default)]
pub struct LessonDraft {
    pub position: u32,
    pub title: String,
    pub description: String,
    pub media: Option<MediaRef>,
    pub duration_minutes: Option<u32>,
    pub preview: bool,
}

impl LessonDraft {
    #[must_use]
    pub fn new(position: u32, title: impl Into<String>) -> Self {
        Self {
            position,
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Validate the draft and bind it to its identity.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` for a blank title, or
    /// `LessonError::InvalidDuration` for a zero duration.
    pub fn validate(self, id: LessonId, course_id: CourseId) -> Result<Lesson, LessonError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        if self.duration_minutes == Some(0) {
            return Err(LessonError::InvalidDuration);
        }

        Ok(Lesson {
            id,
            course_id,
            position: self.position,
            title,
            description: self.description.trim().to_owned(),
            media: self.media,
            duration_minutes: self.duration_minutes,
            preview: self.preview,
        })
    }
}
