use std::fmt;

use lesson_core::model::MediaRef;
use lesson_core::playback::{PlaybackEvent, PlaybackState};

use super::backend::{MediaBackend, MediaError, MediaSession};

/// A decode session bound to exactly one media reference.
///
/// Dropping the resource disposes the session, so a resource that goes out
/// of scope on an error or cancellation path never leaks the decoder.
pub struct PlaybackResource {
    session: Box<dyn MediaSession>,
    media: MediaRef,
    state: PlaybackState,
}

impl PlaybackResource {
    /// Ask the backend for a session and wait for it to initialize.
    ///
    /// A session that comes back without finishing initialization is disposed
    /// and reported as a failure.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if construction fails or leaves the session
    /// uninitialized.
    pub async fn create(backend: &dyn MediaBackend, media: &MediaRef) -> Result<Self, MediaError> {
        let session = backend.create(media).await?;
        let mut resource = Self {
            session,
            media: media.clone(),
            state: PlaybackState::Uninitialized,
        };

        if resource.session.is_initialized() {
            resource.advance(PlaybackEvent::InitSucceeded);
            Ok(resource)
        } else {
            resource.advance(PlaybackEvent::InitFailed);
            resource.dispose();
            Err(MediaError::new(format!(
                "decoder for {media} did not finish initializing"
            )))
        }
    }

    #[must_use]
    pub fn media(&self) -> &MediaRef {
        &self.media
    }

    /// Current lifecycle state, demoting an initialized resource whose
    /// session has since lost its decoder.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        if self.state == PlaybackState::Initialized && !self.session.is_initialized() {
            PlaybackState::Uninitialized
        } else {
            self.state
        }
    }

    /// Switch to other media without rebuilding the decoder.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if the resource cannot accept media or the
    /// backend fails to load it. The resource is left `Failed` in the latter
    /// case and must be replaced.
    pub async fn load(&mut self, media: &MediaRef) -> Result<(), MediaError> {
        if !self.state().accepts_media() {
            return Err(MediaError::new(format!(
                "cannot load into a {} playback resource",
                self.state()
            )));
        }

        match self.session.load(media).await {
            Ok(()) if self.session.is_initialized() => {
                self.advance(PlaybackEvent::LoadSucceeded);
                self.media = media.clone();
                Ok(())
            }
            Ok(()) => {
                self.advance(PlaybackEvent::LoadFailed);
                Err(MediaError::new(format!(
                    "decoder lost initialization while loading {media}"
                )))
            }
            Err(err) => {
                self.advance(PlaybackEvent::LoadFailed);
                Err(err)
            }
        }
    }

    /// Release the session. Safe to call any number of times.
    pub fn dispose(&mut self) {
        if self.state != PlaybackState::Disposed {
            self.session.dispose();
            self.advance(PlaybackEvent::Disposed);
        }
    }

    fn advance(&mut self, event: PlaybackEvent) {
        // An event the lifecycle rejects leaves the resource Failed.
        self.state = self.state.apply(event).unwrap_or(PlaybackState::Failed);
    }
}

impl Drop for PlaybackResource {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PlaybackResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackResource")
            .field("media", &self.media)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
