//! Playback resource lifecycle as plain data.
//!
//! [`PlaybackState`] is the tag carried by a live decode session and
//! [`plan_transition`] maps "what is loaded now" plus "what the next lesson
//! needs" onto a [`TransitionPlan`]. Neither does any I/O, so the
//! reuse → recreate → give-up ladder can be checked without a media backend.

use std::fmt;

use thiserror::Error;

use crate::model::MediaRef;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of one decode/render session.
///
/// ```text
/// Uninitialized ──init ok──▶ Initialized ──dispose──▶ Disposed
///       │                        │
///       └──init failed──▶ Failed ◀──load failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Uninitialized,
    Initialized,
    Failed,
    Disposed,
}

/// Something that happened to a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    InitSucceeded,
    InitFailed,
    LoadSucceeded,
    LoadFailed,
    Disposed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("playback session cannot handle {event:?} while {from}")]
pub struct PlaybackTransitionError {
    pub from: PlaybackState,
    pub event: PlaybackEvent,
}

impl PlaybackState {
    /// Apply an event, rejecting combinations the lifecycle does not allow.
    ///
    /// Disposal is accepted from every state, including `Disposed`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackTransitionError` for an event that is not valid in
    /// the current state (e.g. loading into a failed session).
    pub fn apply(self, event: PlaybackEvent) -> Result<Self, PlaybackTransitionError> {
        use PlaybackEvent as E;
        use PlaybackState as S;

        match (self, event) {
            (_, E::Disposed) => Ok(S::Disposed),
            (S::Uninitialized, E::InitSucceeded) => Ok(S::Initialized),
            (S::Uninitialized, E::InitFailed) => Ok(S::Failed),
            (S::Initialized, E::LoadSucceeded) => Ok(S::Initialized),
            (S::Initialized, E::LoadFailed) => Ok(S::Failed),
            (from, event) => Err(PlaybackTransitionError { from, event }),
        }
    }

    /// Only an initialized session may receive new media.
    #[must_use]
    pub fn accepts_media(self) -> bool {
        matches!(self, PlaybackState::Initialized)
    }

    /// Failed, disposed and never-initialized sessions must be replaced.
    #[must_use]
    pub fn is_stale(self) -> bool {
        !self.accepts_media()
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Uninitialized => "uninitialized",
            PlaybackState::Initialized => "initialized",
            PlaybackState::Failed => "failed",
            PlaybackState::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

//
// ─── PLANNING ──────────────────────────────────────────────────────────────────
//

/// One rung of the recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Ask the existing session to switch media.
    LoadInPlace,
    /// Build a brand new session (disposing whatever is still held).
    Create,
}

/// What to do with the active resource for the next lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// No resource and no media wanted.
    Noop,
    /// The live resource already plays the target media.
    Keep,
    /// No resource yet; build one.
    Create,
    /// Live resource on other media; try switching, then rebuild.
    Reload,
    /// Held resource is unusable; drop it and build a new one.
    ReplaceStale,
    /// Target has no media; drop the held resource.
    Release,
}

impl TransitionPlan {
    /// Attempts to run, in order, until one succeeds.
    #[must_use]
    pub fn attempts(self) -> &'static [Attempt] {
        match self {
            TransitionPlan::Noop | TransitionPlan::Keep | TransitionPlan::Release => &[],
            TransitionPlan::Create | TransitionPlan::ReplaceStale => &[Attempt::Create],
            TransitionPlan::Reload => &[Attempt::LoadInPlace, Attempt::Create],
        }
    }

    /// Whether the held resource is disposed before any attempt runs.
    #[must_use]
    pub fn disposes_first(self) -> bool {
        matches!(self, TransitionPlan::ReplaceStale | TransitionPlan::Release)
    }
}

/// Decide how to move from the current resource to `target`.
///
/// `current` is the state and bound media of the held resource, if any.
#[must_use]
pub fn plan_transition(
    current: Option<(PlaybackState, &MediaRef)>,
    target: Option<&MediaRef>,
) -> TransitionPlan {
    match (current, target) {
        (None, None) => TransitionPlan::Noop,
        (None, Some(_)) => TransitionPlan::Create,
        (Some(_), None) => TransitionPlan::Release,
        (Some((state, _)), Some(_)) if state.is_stale() => TransitionPlan::ReplaceStale,
        (Some((_, bound)), Some(target)) if bound == target => TransitionPlan::Keep,
        (Some(_), Some(_)) => TransitionPlan::Reload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(raw: &str) -> MediaRef {
        MediaRef::parse(raw).unwrap()
    }

    #[test]
    fn lifecycle_accepts_documented_edges() {
        use PlaybackEvent as E;
        use PlaybackState as S;

        assert_eq!(S::Uninitialized.apply(E::InitSucceeded), Ok(S::Initialized));
        assert_eq!(S::Uninitialized.apply(E::InitFailed), Ok(S::Failed));
        assert_eq!(S::Initialized.apply(E::LoadSucceeded), Ok(S::Initialized));
        assert_eq!(S::Initialized.apply(E::LoadFailed), Ok(S::Failed));
        for state in [S::Uninitialized, S::Initialized, S::Failed, S::Disposed] {
            assert_eq!(state.apply(E::Disposed), Ok(S::Disposed));
        }
    }

    #[test]
    fn failed_and_disposed_sessions_never_load() {
        use PlaybackEvent as E;
        use PlaybackState as S;

        for state in [S::Failed, S::Disposed] {
            assert!(state.apply(E::LoadSucceeded).is_err());
            assert!(state.apply(E::InitSucceeded).is_err());
            assert!(!state.accepts_media());
        }
        assert!(S::Uninitialized.apply(E::LoadSucceeded).is_err());
    }

    #[test]
    fn plan_follows_decision_table() {
        let a = media("a.mp4");
        let b = media("b.mp4");
        let ready = PlaybackState::Initialized;

        assert_eq!(plan_transition(None, None), TransitionPlan::Noop);
        assert_eq!(plan_transition(None, Some(&a)), TransitionPlan::Create);
        assert_eq!(plan_transition(Some((ready, &a)), Some(&a)), TransitionPlan::Keep);
        assert_eq!(plan_transition(Some((ready, &a)), Some(&b)), TransitionPlan::Reload);
        assert_eq!(plan_transition(Some((ready, &a)), None), TransitionPlan::Release);
        for stale in [
            PlaybackState::Uninitialized,
            PlaybackState::Failed,
            PlaybackState::Disposed,
        ] {
            assert_eq!(
                plan_transition(Some((stale, &a)), Some(&a)),
                TransitionPlan::ReplaceStale
            );
            assert_eq!(plan_transition(Some((stale, &a)), None), TransitionPlan::Release);
        }
    }

    #[test]
    fn reload_ladder_tries_reuse_before_recreate() {
        assert_eq!(
            TransitionPlan::Reload.attempts(),
            &[Attempt::LoadInPlace, Attempt::Create]
        );
        assert!(!TransitionPlan::Reload.disposes_first());
        assert_eq!(TransitionPlan::ReplaceStale.attempts(), &[Attempt::Create]);
        assert!(TransitionPlan::ReplaceStale.disposes_first());
        assert!(TransitionPlan::Keep.attempts().is_empty());
    }
}
