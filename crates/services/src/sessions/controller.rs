use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lesson_core::Clock;
use lesson_core::model::{CourseId, CourseProgressSummary, Lesson, LessonId, LessonProgress, UserId};
use storage::repository::EnrollmentGateway;
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tracing::{debug, info, warn};

use super::snapshot::{PlaybackStatus, SessionSignal, SessionSnapshot};
use crate::error::{InvalidState, SessionError};
use crate::playback::{PlaybackResourceManager, TransitionOutcome};
use crate::progress_tracker::LessonProgressTracker;

/// How the viewer may use the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Enrolled,
    /// Not enrolled: only preview lessons, no progress changes.
    PreviewOnly,
}

/// Result of a lesson selection. Playback problems do not fail selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOutcome {
    pub lesson_id: LessonId,
    pub playback: PlaybackStatus,
    /// `None` when the playback transition failed.
    pub transition: Option<TransitionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub lesson_id: LessonId,
    pub summary: CourseProgressSummary,
    pub newly_completed: bool,
    /// This call finished the course; lets the caller show a distinct notice.
    pub course_completed: bool,
}

struct SessionState {
    current: Option<LessonId>,
    playback: PlaybackResourceManager,
    playback_status: PlaybackStatus,
    tracker: LessonProgressTracker,
    course_completed_sent: bool,
}

pub(crate) struct SessionSetup {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub access: Access,
    pub lessons: Vec<Lesson>,
    pub clock: Clock,
    pub gateway: Arc<dyn EnrollmentGateway>,
    pub tracker: LessonProgressTracker,
    pub playback: PlaybackResourceManager,
    pub signal_capacity: usize,
}

/// Single entry point for one user viewing one course.
///
/// Selections and completions are serialized: a call made while another is
/// still running is rejected with [`InvalidState::Busy`] instead of waiting.
pub struct LessonSessionController {
    user_id: UserId,
    course_id: CourseId,
    access: Access,
    lessons: Vec<Lesson>,
    clock: Clock,
    gateway: Arc<dyn EnrollmentGateway>,
    state: Mutex<SessionState>,
    published: watch::Sender<SessionSnapshot>,
    signals: broadcast::Sender<SessionSignal>,
    closed: AtomicBool,
}

impl LessonSessionController {
    pub(crate) fn new(setup: SessionSetup) -> Self {
        let SessionSetup {
            user_id,
            course_id,
            access,
            mut lessons,
            clock,
            gateway,
            tracker,
            playback,
            signal_capacity,
        } = setup;
        lessons.sort_by_key(|lesson| (lesson.position(), lesson.id()));

        let state = SessionState {
            current: None,
            playback,
            playback_status: PlaybackStatus::None,
            tracker,
            course_completed_sent: false,
        };
        let (published, _) = watch::channel(SessionSnapshot {
            current_lesson: None,
            summary: state.tracker.summary(),
            progress: state.tracker.records().cloned().collect(),
            playback: PlaybackStatus::None,
            is_busy: false,
            is_closed: false,
        });
        let (signals, _) = broadcast::channel(signal_capacity.max(1));

        Self {
            user_id,
            course_id,
            access,
            lessons,
            clock,
            gateway,
            state: Mutex::new(state),
            published,
            signals,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Lessons in course order.
    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn lesson(&self, lesson_id: LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|lesson| lesson.id() == lesson_id)
    }

    //
    // ─── COMMANDS ──────────────────────────────────────────────────────────────
    //

    /// Make `lesson_id` the current lesson and prepare its playback.
    ///
    /// A playback failure is reported in the outcome and as a
    /// [`SessionSignal::PlaybackUnavailable`]; the lesson still becomes
    /// current. The "lesson opened" call to the enrollment gateway is
    /// advisory: it runs in the background and its failure is only logged.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the session is closed, busy,
    /// or the lesson is locked for a preview viewer, and
    /// `SessionError::NotFound` for a lesson outside the course.
    pub async fn select_lesson(&self, lesson_id: LessonId) -> Result<SelectOutcome, SessionError> {
        let mut state = self.begin()?;
        let lesson = self
            .lesson(lesson_id)
            .ok_or(SessionError::NotFound(lesson_id))?;
        if self.access == Access::PreviewOnly && !lesson.is_preview() {
            return Err(InvalidState::LockedLesson(lesson_id).into());
        }

        let (playback, transition) = match state.playback.transition_to(lesson.media()).await {
            Ok(outcome) => {
                let status = lesson
                    .media()
                    .map_or(PlaybackStatus::None, |media| PlaybackStatus::Ready(media.clone()));
                (status, Some(outcome))
            }
            Err(unavailable) => {
                let _ = self
                    .signals
                    .send(SessionSignal::PlaybackUnavailable(unavailable.clone()));
                (PlaybackStatus::Unavailable(unavailable), None)
            }
        };

        state.current = Some(lesson_id);
        state.playback_status = playback.clone();
        self.publish(&state);
        drop(state);
        info!(user = %self.user_id, lesson = %lesson_id, ?transition, "lesson selected");

        if self.access == Access::Enrolled {
            self.notify_opened(lesson_id);
        }

        Ok(SelectOutcome {
            lesson_id,
            playback,
            transition,
        })
    }

    /// Complete the current lesson.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when closed, busy, not enrolled,
    /// nothing is selected, or the current lesson is already complete, and
    /// `SessionError::PersistenceFailure` if the write is refused.
    pub async fn mark_current_complete(&self) -> Result<CompletionOutcome, SessionError> {
        let mut state = self.begin()?;
        self.ensure_enrolled()?;
        let current = state.current.ok_or(InvalidState::NoLessonSelected)?;
        if state.tracker.is_completed(current) {
            return Err(InvalidState::AlreadyCompleted.into());
        }
        self.complete_locked(&mut state, current).await
    }

    /// Complete any lesson of the course. Completing a completed lesson is a
    /// successful no-op with no external calls.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when closed, busy or not enrolled,
    /// `SessionError::NotFound` for a lesson outside the course, and
    /// `SessionError::PersistenceFailure` if the write is refused.
    pub async fn complete_lesson(&self, lesson_id: LessonId) -> Result<CompletionOutcome, SessionError> {
        let mut state = self.begin()?;
        self.ensure_enrolled()?;
        self.complete_locked(&mut state, lesson_id).await
    }

    /// Release playback and refuse further commands.
    ///
    /// Waits for an in-flight transition to settle so whatever resource it
    /// produced is disposed here. Safe to call more than once.
    pub async fn close_session(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let released = state.playback.release_if_active();
        state.playback_status = PlaybackStatus::None;
        self.publish(&state);
        debug!(user = %self.user_id, course = %self.course_id, released, "session closed");
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// Latest settled state plus whether an operation is in flight.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.published.borrow().clone();
        snapshot.is_busy = self.state.try_lock().is_err();
        snapshot.is_closed = self.is_closed();
        snapshot
    }

    #[must_use]
    pub fn summary(&self) -> CourseProgressSummary {
        self.published.borrow().summary
    }

    #[must_use]
    pub fn current_lesson(&self) -> Option<LessonId> {
        self.published.borrow().current_lesson
    }

    #[must_use]
    pub fn progress_of(&self, lesson_id: LessonId) -> Option<LessonProgress> {
        self.published
            .borrow()
            .progress
            .iter()
            .find(|record| record.lesson_id() == lesson_id)
            .cloned()
    }

    /// Lesson after the current one; the first lesson when none is selected.
    #[must_use]
    pub fn next_lesson(&self) -> Option<LessonId> {
        match self.current_index() {
            Some(index) => self.lessons.get(index + 1),
            None => self.lessons.first(),
        }
        .map(Lesson::id)
    }

    #[must_use]
    pub fn previous_lesson(&self) -> Option<LessonId> {
        let index = self.current_index()?;
        index
            .checked_sub(1)
            .and_then(|prev| self.lessons.get(prev))
            .map(Lesson::id)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscription point for playback and course-completion signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Receiver that is notified whenever the settled state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.published.subscribe()
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn begin(&self) -> Result<MutexGuard<'_, SessionState>, InvalidState> {
        if self.is_closed() {
            return Err(InvalidState::Closed);
        }
        let guard = self.state.try_lock().map_err(|_| InvalidState::Busy)?;
        // close_session may have flagged the session while we raced for the lock.
        if self.is_closed() {
            return Err(InvalidState::Closed);
        }
        Ok(guard)
    }

    /// Fire-and-forget "lesson opened" notice; a slow or failing gateway
    /// never holds up the selection.
    fn notify_opened(&self, lesson_id: LessonId) {
        let gateway = Arc::clone(&self.gateway);
        let (user_id, at) = (self.user_id, self.clock.now());
        tokio::spawn(async move {
            if let Err(err) = gateway.open_lesson(user_id, lesson_id, at).await {
                warn!(
                    user = %user_id,
                    lesson = %lesson_id,
                    error = %err,
                    "lesson-opened notice dropped"
                );
            }
        });
    }

    fn ensure_enrolled(&self) -> Result<(), InvalidState> {
        match self.access {
            Access::Enrolled => Ok(()),
            Access::PreviewOnly => Err(InvalidState::NotEnrolled),
        }
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current_lesson()?;
        self.lessons.iter().position(|lesson| lesson.id() == current)
    }

    async fn complete_locked(
        &self,
        state: &mut SessionState,
        lesson_id: LessonId,
    ) -> Result<CompletionOutcome, SessionError> {
        let done = state.tracker.complete(lesson_id).await?;

        let course_completed = done.reached_full_course && !state.course_completed_sent;
        if course_completed {
            state.course_completed_sent = true;
            info!(user = %self.user_id, course = %self.course_id, "course completed");
            let _ = self.signals.send(SessionSignal::CourseCompleted(done.summary));
        }
        self.publish(state);

        Ok(CompletionOutcome {
            lesson_id,
            summary: done.summary,
            newly_completed: done.newly_completed,
            course_completed,
        })
    }

    fn publish(&self, state: &SessionState) {
        self.published.send_replace(SessionSnapshot {
            current_lesson: state.current,
            summary: state.tracker.summary(),
            progress: state.tracker.records().cloned().collect(),
            playback: state.playback_status.clone(),
            is_busy: false,
            is_closed: self.is_closed(),
        });
    }
}

impl fmt::Debug for LessonSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonSessionController")
            .field("user_id", &self.user_id)
            .field("course_id", &self.course_id)
            .field("access", &self.access)
            .field("lessons_len", &self.lessons.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
