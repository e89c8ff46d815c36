mod ids;
mod lesson;
mod media;
mod progress;

pub use ids::{CourseId, LessonId, ParseIdError, UserId};
pub use lesson::{Lesson, LessonDraft, LessonError};
pub use media::{MediaRef, MediaRefError};
pub use progress::{CourseProgressSummary, LessonProgress};
