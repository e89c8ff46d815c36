use lesson_core::model::{CourseProgressSummary, LessonId, LessonProgress, MediaRef};

use crate::error::PlaybackUnavailable;

/// Playback as the presentation layer should render it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Current lesson has no video (or nothing is selected).
    #[default]
    None,
    Ready(MediaRef),
    Unavailable(PlaybackUnavailable),
}

/// Notifications pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    PlaybackUnavailable(PlaybackUnavailable),
    /// Sent once per session, when the last lesson is completed.
    CourseCompleted(CourseProgressSummary),
}

/// Settled, user-visible state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub current_lesson: Option<LessonId>,
    pub summary: CourseProgressSummary,
    /// Per-lesson records in course order.
    pub progress: Vec<LessonProgress>,
    pub playback: PlaybackStatus,
    /// A selection or completion is in flight; the fields above still show
    /// the state from before it started.
    pub is_busy: bool,
    pub is_closed: bool,
}
