use async_trait::async_trait;
use lesson_core::model::MediaRef;
use thiserror::Error;

/// Why the media backend could not open or switch media.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MediaError(pub String);

impl MediaError {
    #[must_use]
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// Factory for decode/render sessions. Creation is assumed to be expensive.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Build a session for `media`.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if the decoder cannot be set up.
    async fn create(&self, media: &MediaRef) -> Result<Box<dyn MediaSession>, MediaError>;
}

/// One live decode/render session owned by a single playback resource.
#[async_trait]
pub trait MediaSession: Send {
    /// Switch the session to other media in place.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if the new media cannot be opened, including
    /// files that exist but fail while being read.
    async fn load(&mut self, media: &MediaRef) -> Result<(), MediaError>;

    fn is_initialized(&self) -> bool;

    /// Release decoder resources. Must be idempotent and must not panic.
    fn dispose(&mut self);
}
