//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use lesson_core::model::{CourseId, LessonId, MediaRef};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Which rung of the playback fallback ladder gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStage {
    /// Building a first resource for the media failed.
    Create,
    /// Building a replacement after a failed in-place load also failed.
    Recreate,
}

impl fmt::Display for PlaybackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackStage::Create => f.write_str("create"),
            PlaybackStage::Recreate => f.write_str("recreate"),
        }
    }
}

/// Playback could not be prepared for a lesson. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("playback unavailable for {media} ({stage} failed): {cause}")]
pub struct PlaybackUnavailable {
    pub media: MediaRef,
    pub stage: PlaybackStage,
    pub cause: String,
}

/// Requests rejected before any external call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvalidState {
    #[error("another lesson transition is still in progress")]
    Busy,
    #[error("no lesson is selected")]
    NoLessonSelected,
    #[error("lesson is already completed")]
    AlreadyCompleted,
    #[error("session is closed")]
    Closed,
    #[error("user is not enrolled in this course")]
    NotEnrolled,
    #[error("lesson {0} requires an enrollment")]
    LockedLesson(LessonId),
    #[error("lesson {0} appears more than once in the course")]
    DuplicateLesson(LessonId),
}

/// Errors emitted by the lesson viewing session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] StorageError),
    #[error(transparent)]
    ResourceUnavailable(#[from] PlaybackUnavailable),
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error("lesson {0} is not part of this session")]
    NotFound(LessonId),
    #[error("course {0} does not exist")]
    CourseNotFound(CourseId),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
