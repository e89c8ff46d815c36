use std::sync::Arc;

use lesson_core::model::MediaRef;
use lesson_core::playback::{Attempt, PlaybackState, TransitionPlan, plan_transition};
use tracing::{debug, info, warn};

use super::backend::{MediaBackend, MediaError};
use super::resource::PlaybackResource;
use crate::error::{PlaybackStage, PlaybackUnavailable};

/// What a successful transition did to the active resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Nothing to do: already bound to the target, or no media either way.
    Unchanged,
    /// A resource was built where there was none (or only a stale one).
    Created,
    /// The existing resource switched media in place.
    Reused,
    /// In-place load failed and a fresh resource replaced the old one.
    Recreated,
    /// The target has no media and the held resource was disposed.
    Released,
}

/// Owns at most one live [`PlaybackResource`] and decides, per lesson
/// change, whether to keep, reload, rebuild or drop it.
pub struct PlaybackResourceManager {
    backend: Arc<dyn MediaBackend>,
    active: Option<PlaybackResource>,
}

impl PlaybackResourceManager {
    #[must_use]
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    #[must_use]
    pub fn active_media(&self) -> Option<&MediaRef> {
        self.active.as_ref().map(PlaybackResource::media)
    }

    #[must_use]
    pub fn active_state(&self) -> Option<PlaybackState> {
        self.active.as_ref().map(PlaybackResource::state)
    }

    /// Bring the active resource in line with `target`.
    ///
    /// Reuse is tried before recreation. On failure no resource is left
    /// active, so the next transition starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackUnavailable` once every rung of the ladder failed.
    pub async fn transition_to(
        &mut self,
        target: Option<&MediaRef>,
    ) -> Result<TransitionOutcome, PlaybackUnavailable> {
        let current = self.active.as_ref().map(|r| (r.state(), r.media()));
        let plan = plan_transition(current, target);
        debug!(?plan, target = ?target.map(ToString::to_string), "playback transition");

        if plan.disposes_first() {
            self.release_if_active();
        }
        let Some(target) = target else {
            return Ok(if plan == TransitionPlan::Release {
                TransitionOutcome::Released
            } else {
                TransitionOutcome::Unchanged
            });
        };
        if plan == TransitionPlan::Keep {
            return Ok(TransitionOutcome::Unchanged);
        }

        let mut reload_failed = false;
        let mut last_error = MediaError::new("no playback attempt was made");
        for attempt in plan.attempts() {
            match attempt {
                Attempt::LoadInPlace => {
                    let Some(resource) = self.active.as_mut() else {
                        continue;
                    };
                    match resource.load(target).await {
                        Ok(()) => return Ok(TransitionOutcome::Reused),
                        Err(err) => {
                            warn!(media = %target, error = %err, "in-place load failed; recreating");
                            reload_failed = true;
                            last_error = err;
                            self.release_if_active();
                        }
                    }
                }
                Attempt::Create => {
                    self.release_if_active();
                    match PlaybackResource::create(self.backend.as_ref(), target).await {
                        Ok(resource) => {
                            info!(media = %target, "playback resource ready");
                            self.active = Some(resource);
                            return Ok(if reload_failed {
                                TransitionOutcome::Recreated
                            } else {
                                TransitionOutcome::Created
                            });
                        }
                        Err(err) => last_error = err,
                    }
                }
            }
        }

        let stage = if reload_failed {
            PlaybackStage::Recreate
        } else {
            PlaybackStage::Create
        };
        warn!(media = %target, %stage, error = %last_error, "playback unavailable");
        Err(PlaybackUnavailable {
            media: target.clone(),
            stage,
            cause: last_error.0,
        })
    }

    /// Dispose the active resource, if any. Returns whether one was held.
    pub fn release_if_active(&mut self) -> bool {
        match self.active.take() {
            Some(mut resource) => {
                debug!(media = %resource.media(), "releasing playback resource");
                resource.dispose();
                true
            }
            None => false,
        }
    }
}

impl Drop for PlaybackResourceManager {
    fn drop(&mut self) {
        self.release_if_active();
    }
}
