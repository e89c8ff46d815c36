mod controller;
mod snapshot;
mod viewer;

// Public API of the lesson viewing subsystem.
pub use crate::error::SessionError;
pub use controller::{Access, CompletionOutcome, LessonSessionController, SelectOutcome};
pub use snapshot::{PlaybackStatus, SessionSignal, SessionSnapshot};
pub use viewer::{ViewerService, ViewerSettings};
