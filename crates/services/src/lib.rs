#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod playback;
pub mod progress_tracker;
pub mod sessions;

pub use lesson_core::Clock;

pub use app_services::{AppServices, UserSession};
pub use error::{AppServicesError, InvalidState, PlaybackStage, PlaybackUnavailable, SessionError};
pub use playback::{MediaBackend, MediaError, MediaSession, PlaybackResourceManager, TransitionOutcome};
pub use progress_tracker::{Completion, LessonProgressTracker};
pub use sessions::{
    Access, CompletionOutcome, LessonSessionController, PlaybackStatus, SelectOutcome,
    SessionSignal, SessionSnapshot, ViewerService, ViewerSettings,
};
