mod backend;
mod manager;
mod resource;

pub use backend::{MediaBackend, MediaError, MediaSession};
pub use manager::{PlaybackResourceManager, TransitionOutcome};
pub use resource::PlaybackResource;
