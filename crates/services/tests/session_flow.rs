use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{CourseId, Lesson, LessonDraft, LessonId, MediaRef, UserId};
use lesson_core::time::fixed_now;
use services::{
    Access, AppServices, Clock, InvalidState, MediaBackend, MediaError, MediaSession,
    PlaybackStatus, SessionError, SessionSignal, TransitionOutcome, ViewerSettings,
};
use storage::repository::{
    CourseRecord, EnrollmentGateway, InMemoryRepository, LessonCatalog, LessonEventKind,
    ProgressStore, Storage, StorageError,
};
use tokio::sync::Notify;

const COURSE: CourseId = CourseId::new(1);
const USER: UserId = UserId::new(7);

fn lesson(id: u64) -> LessonId {
    LessonId::new(id)
}

//
// ─── SCRIPTED MEDIA BACKEND ────────────────────────────────────────────────────
//

#[derive(Default)]
struct Script {
    fail_create: HashSet<String>,
    created: Vec<String>,
    loaded: Vec<String>,
    live: usize,
    disposed: usize,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

#[derive(Clone, Default)]
struct ScriptedBackend(Arc<Mutex<Script>>);

impl ScriptedBackend {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap()
    }

    /// Park the next `create` until the returned gate is notified. The first
    /// notify fires once `create` has started.
    fn hold_next_create(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        self.script().hold = Some((Arc::clone(&entered), Arc::clone(&gate)));
        (entered, gate)
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    disposed: bool,
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn create(&self, media: &MediaRef) -> Result<Box<dyn MediaSession>, MediaError> {
        let hold = self.script().hold.take();
        if let Some((entered, gate)) = hold {
            entered.notify_one();
            gate.notified().await;
        }

        let name = media.to_string();
        let mut script = self.script();
        if script.fail_create.contains(&name) {
            return Err(MediaError::new(format!("cannot decode {name}")));
        }
        script.created.push(name);
        script.live += 1;
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.0),
            disposed: false,
        }))
    }
}

#[async_trait]
impl MediaSession for ScriptedSession {
    async fn load(&mut self, media: &MediaRef) -> Result<(), MediaError> {
        self.script.lock().unwrap().loaded.push(media.to_string());
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        !self.disposed
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            let mut script = self.script.lock().unwrap();
            script.live -= 1;
            script.disposed += 1;
        }
    }
}

//
// ─── STORAGE FIXTURES ──────────────────────────────────────────────────────────
//

/// Gateway that refuses completions for chosen lessons.
#[derive(Clone)]
struct FlakyGateway {
    inner: InMemoryRepository,
    refuse: HashSet<LessonId>,
    refuse_open: bool,
}

#[async_trait]
impl EnrollmentGateway for FlakyGateway {
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError> {
        self.inner.is_enrolled(user_id, course_id).await
    }

    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.enroll(user_id, course_id, at).await
    }

    async fn open_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.refuse_open {
            return Err(StorageError::Connection("gateway offline".into()));
        }
        self.inner.open_lesson(user_id, lesson_id, at).await
    }

    async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.refuse.contains(&lesson_id) {
            return Err(StorageError::Connection("gateway offline".into()));
        }
        self.inner.complete_lesson(user_id, lesson_id, at).await
    }
}

/// Catalog that reports the first lesson twice.
struct DuplicatingCatalog(InMemoryRepository);

#[async_trait]
impl LessonCatalog for DuplicatingCatalog {
    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StorageError> {
        self.0.upsert_course(course).await
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        self.0.upsert_lesson(lesson).await
    }

    async fn lessons_for_course(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let mut lessons = self.0.lessons_for_course(course_id).await?;
        if let Some(first) = lessons.first().cloned() {
            lessons.push(first);
        }
        Ok(lessons)
    }
}

/// Course with lessons A ("a.mp4"), B ("b.mp4") and C (no media). A is a preview.
async fn seeded_repo(enroll: bool) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.upsert_course(&CourseRecord {
        id: COURSE,
        title: "Rust for the impatient".into(),
    })
    .await
    .unwrap();

    let drafts = [
        LessonDraft::new(1, "A")
            .with_media(MediaRef::parse("a.mp4").unwrap())
            .preview(true),
        LessonDraft::new(2, "B").with_media(MediaRef::parse("b.mp4").unwrap()),
        LessonDraft::new(3, "C").with_description("reading only"),
    ];
    for (i, draft) in drafts.into_iter().enumerate() {
        let lesson = draft.validate(lesson(i as u64 + 1), COURSE).unwrap();
        repo.upsert_lesson(&lesson).await.unwrap();
    }

    if enroll {
        repo.enroll(USER, COURSE, fixed_now()).await.unwrap();
    }
    repo
}

fn storage_over(repo: &InMemoryRepository, gateway: Arc<dyn EnrollmentGateway>) -> Storage {
    let catalog: Arc<dyn LessonCatalog> = Arc::new(repo.clone());
    let progress: Arc<dyn ProgressStore> = Arc::new(repo.clone());
    Storage {
        catalog,
        progress,
        enrollments: gateway,
    }
}

fn services(storage: Storage, backend: &ScriptedBackend) -> AppServices {
    AppServices::from_storage(
        storage,
        Clock::fixed(fixed_now()),
        Arc::new(backend.clone()),
        ViewerSettings::default(),
    )
}

fn completed_events(repo: &InMemoryRepository) -> usize {
    repo.events()
        .unwrap()
        .iter()
        .filter(|event| event.kind == LessonEventKind::Completed)
        .count()
}

fn opened_events(repo: &InMemoryRepository) -> usize {
    repo.events()
        .unwrap()
        .iter()
        .filter(|event| event.kind == LessonEventKind::Opened)
        .count()
}

/// "Lesson opened" notices run in the background; give them a chance to land.
async fn settle_opened_events(repo: &InMemoryRepository, expected: usize) {
    for _ in 0..1_000 {
        if opened_events(repo) >= expected {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(opened_events(repo), expected);
}

/// Gateway whose "lesson opened" call waits until `gate` is notified.
struct StalledGateway {
    inner: InMemoryRepository,
    gate: Arc<Notify>,
}

#[async_trait]
impl EnrollmentGateway for StalledGateway {
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId) -> Result<bool, StorageError> {
        self.inner.is_enrolled(user_id, course_id).await
    }

    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.enroll(user_id, course_id, at).await
    }

    async fn open_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.gate.notified().await;
        self.inner.open_lesson(user_id, lesson_id, at).await
    }

    async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.complete_lesson(user_id, lesson_id, at).await
    }
}

//
// ─── SCENARIOS ─────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn walks_a_course_from_start_to_completion() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let user = app.login(USER);
    let session = app.viewer().open_course(&user, COURSE).await.unwrap();
    let mut signals = session.subscribe();

    assert_eq!(session.access(), Access::Enrolled);
    assert_eq!(session.summary().to_string(), "0% (0/3)");
    assert_eq!(session.current_lesson(), None);

    let a = session.select_lesson(lesson(1)).await.unwrap();
    assert_eq!(a.transition, Some(TransitionOutcome::Created));
    assert_eq!(a.playback, PlaybackStatus::Ready(MediaRef::parse("a.mp4").unwrap()));
    assert_eq!(backend.script().created, vec!["a.mp4"]);

    let b = session.select_lesson(lesson(2)).await.unwrap();
    assert_eq!(b.transition, Some(TransitionOutcome::Reused));
    assert_eq!(backend.script().created.len(), 1);
    assert_eq!(backend.script().loaded, vec!["b.mp4"]);

    let c = session.select_lesson(lesson(3)).await.unwrap();
    assert_eq!(c.transition, Some(TransitionOutcome::Released));
    assert_eq!(c.playback, PlaybackStatus::None);
    assert_eq!(backend.script().live, 0);

    let first = session.complete_lesson(lesson(1)).await.unwrap();
    assert_eq!(first.summary.to_string(), "33% (1/3)");
    assert!(first.newly_completed);
    assert_eq!(completed_events(&repo), 1);

    let again = session.complete_lesson(lesson(1)).await.unwrap();
    assert!(!again.newly_completed);
    assert_eq!(again.summary.to_string(), "33% (1/3)");
    assert_eq!(completed_events(&repo), 1);

    let b_done = session.complete_lesson(lesson(2)).await.unwrap();
    assert!(!b_done.course_completed);
    assert!(signals.try_recv().is_err());

    let c_done = session.mark_current_complete().await.unwrap();
    assert_eq!(c_done.lesson_id, lesson(3));
    assert!(c_done.course_completed);
    assert_eq!(c_done.summary.to_string(), "100% (3/3)");
    assert_eq!(
        signals.try_recv().unwrap(),
        SessionSignal::CourseCompleted(c_done.summary)
    );

    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_lesson, Some(lesson(3)));
    assert!(snapshot.progress.iter().all(|p| p.is_completed()));
    assert!(!snapshot.is_busy);

    settle_opened_events(&repo, 3).await;

    session.close_session().await;
    user.logout();
}

#[tokio::test]
async fn failed_construction_keeps_the_selection() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    backend.script().fail_create.insert("a.mp4".into());
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let user = app.login(USER);
    let session = app.viewer().open_course(&user, COURSE).await.unwrap();
    let mut signals = session.subscribe();

    let outcome = session.select_lesson(lesson(1)).await.unwrap();
    assert_eq!(outcome.transition, None);
    let PlaybackStatus::Unavailable(unavailable) = &outcome.playback else {
        panic!("expected unavailable playback, got {:?}", outcome.playback);
    };
    assert_eq!(unavailable.media, MediaRef::parse("a.mp4").unwrap());
    assert_eq!(session.current_lesson(), Some(lesson(1)));
    assert_eq!(session.summary().to_string(), "0% (0/3)");
    assert!(matches!(
        signals.try_recv().unwrap(),
        SessionSignal::PlaybackUnavailable(_)
    ));

    let next = session.select_lesson(lesson(2)).await.unwrap();
    assert_eq!(next.transition, Some(TransitionOutcome::Created));
    assert_eq!(backend.script().created, vec!["b.mp4"]);
    assert_eq!(backend.script().live, 1);
}

#[tokio::test]
async fn refused_completion_leaves_progress_untouched() {
    let repo = seeded_repo(true).await;
    let gateway = FlakyGateway {
        inner: repo.clone(),
        refuse: HashSet::from([lesson(1)]),
        refuse_open: false,
    };
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(gateway)), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();

    session.select_lesson(lesson(1)).await.unwrap();
    let err = session.mark_current_complete().await.unwrap_err();
    assert!(matches!(err, SessionError::PersistenceFailure(_)));
    assert!(!session.progress_of(lesson(1)).unwrap().is_completed());
    assert_eq!(session.summary().to_string(), "0% (0/3)");
    assert_eq!(repo.find(USER, lesson(1)).await.unwrap(), None);
}

#[tokio::test]
async fn lesson_opened_failures_are_not_fatal() {
    let repo = seeded_repo(true).await;
    let gateway = FlakyGateway {
        inner: repo.clone(),
        refuse: HashSet::new(),
        refuse_open: true,
    };
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(gateway)), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();

    session.select_lesson(lesson(2)).await.unwrap();
    assert_eq!(session.current_lesson(), Some(lesson(2)));
    assert!(repo.events().unwrap().is_empty());
}

#[tokio::test]
async fn stalled_lesson_opened_notice_does_not_hold_up_selection() {
    let repo = seeded_repo(true).await;
    let gate = Arc::new(Notify::new());
    let gateway = StalledGateway {
        inner: repo.clone(),
        gate: Arc::clone(&gate),
    };
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(gateway)), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), session.select_lesson(lesson(2)))
        .await
        .expect("selection should not wait for the gateway")
        .unwrap();
    assert_eq!(outcome.lesson_id, lesson(2));
    assert!(!session.snapshot().is_busy);
    assert_eq!(opened_events(&repo), 0);

    gate.notify_one();
    settle_opened_events(&repo, 1).await;
}

#[tokio::test]
async fn rejects_commands_that_do_not_fit_the_state() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();

    assert!(matches!(
        session.mark_current_complete().await,
        Err(SessionError::InvalidState(InvalidState::NoLessonSelected))
    ));
    assert!(matches!(
        session.select_lesson(lesson(99)).await,
        Err(SessionError::NotFound(id)) if id == lesson(99)
    ));
    assert!(matches!(
        session.complete_lesson(lesson(99)).await,
        Err(SessionError::NotFound(_))
    ));

    session.select_lesson(lesson(1)).await.unwrap();
    session.mark_current_complete().await.unwrap();
    assert!(matches!(
        session.mark_current_complete().await,
        Err(SessionError::InvalidState(InvalidState::AlreadyCompleted))
    ));
    assert_eq!(completed_events(&repo), 1);

    session.close_session().await;
    assert!(matches!(
        session.select_lesson(lesson(2)).await,
        Err(SessionError::InvalidState(InvalidState::Closed))
    ));
    assert!(session.snapshot().is_closed);
}

#[tokio::test]
async fn unknown_course_and_duplicate_lessons_are_rejected() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let user = app.login(USER);

    assert!(matches!(
        app.viewer().open_course(&user, CourseId::new(404)).await,
        Err(SessionError::CourseNotFound(_))
    ));

    let catalog: Arc<dyn LessonCatalog> = Arc::new(DuplicatingCatalog(repo.clone()));
    let storage = Storage {
        catalog,
        progress: Arc::new(repo.clone()),
        enrollments: Arc::new(repo.clone()),
    };
    let app = services(storage, &backend);
    assert!(matches!(
        app.viewer().open_course(&user, COURSE).await,
        Err(SessionError::InvalidState(InvalidState::DuplicateLesson(id))) if id == lesson(1)
    ));
}

#[tokio::test]
async fn preview_viewers_only_reach_preview_lessons() {
    let repo = seeded_repo(false).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let user = app.login(USER);
    let session = app.viewer().open_course(&user, COURSE).await.unwrap();

    assert_eq!(session.access(), Access::PreviewOnly);
    session.select_lesson(lesson(1)).await.unwrap();
    assert!(matches!(
        session.select_lesson(lesson(2)).await,
        Err(SessionError::InvalidState(InvalidState::LockedLesson(_)))
    ));
    assert!(matches!(
        session.mark_current_complete().await,
        Err(SessionError::InvalidState(InvalidState::NotEnrolled))
    ));
    assert!(repo.events().unwrap().is_empty());

    let strict = AppServices::from_storage(
        storage_over(&repo, Arc::new(repo.clone())),
        Clock::fixed(fixed_now()),
        Arc::new(backend.clone()),
        ViewerSettings {
            allow_preview: false,
            ..ViewerSettings::default()
        },
    );
    assert!(matches!(
        strict.viewer().open_course(&user, COURSE).await,
        Err(SessionError::InvalidState(InvalidState::NotEnrolled))
    ));
}

#[tokio::test]
async fn watchers_observe_each_settled_state() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();
    let mut updates = session.watch();
    assert_eq!(updates.borrow_and_update().current_lesson, None);

    session.select_lesson(lesson(1)).await.unwrap();
    updates.changed().await.unwrap();
    {
        let seen = updates.borrow_and_update();
        assert_eq!(seen.current_lesson, Some(lesson(1)));
        assert_eq!(
            seen.playback,
            PlaybackStatus::Ready(MediaRef::parse("a.mp4").unwrap())
        );
    }

    session.complete_lesson(lesson(1)).await.unwrap();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().summary.completed_count(), 1);

    session.close_session().await;
    updates.changed().await.unwrap();
    let closed = updates.borrow_and_update();
    assert!(closed.is_closed);
    assert_eq!(closed.playback, PlaybackStatus::None);
}

#[tokio::test]
async fn navigation_follows_course_order() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = app
        .viewer()
        .open_course(&app.login(USER), COURSE)
        .await
        .unwrap();

    assert_eq!(session.next_lesson(), Some(lesson(1)));
    assert_eq!(session.previous_lesson(), None);

    session.select_lesson(lesson(2)).await.unwrap();
    assert_eq!(session.next_lesson(), Some(lesson(3)));
    assert_eq!(session.previous_lesson(), Some(lesson(1)));

    session.select_lesson(lesson(3)).await.unwrap();
    assert_eq!(session.next_lesson(), None);
}

//
// ─── CONCURRENCY ───────────────────────────────────────────────────────────────
//

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_commands_are_rejected_as_busy() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = Arc::new(
        app.viewer()
            .open_course(&app.login(USER), COURSE)
            .await
            .unwrap(),
    );

    let (entered, gate) = backend.hold_next_create();
    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.select_lesson(lesson(1)).await }
    });
    entered.notified().await;

    assert!(session.snapshot().is_busy);
    assert_eq!(session.snapshot().current_lesson, None);
    assert!(matches!(
        session.select_lesson(lesson(2)).await,
        Err(SessionError::InvalidState(InvalidState::Busy))
    ));
    assert!(matches!(
        session.complete_lesson(lesson(1)).await,
        Err(SessionError::InvalidState(InvalidState::Busy))
    ));

    gate.notify_one();
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome.lesson_id, lesson(1));
    assert!(!session.snapshot().is_busy);
    assert_eq!(backend.script().created, vec!["a.mp4"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_during_a_transition_disposes_its_resource() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = Arc::new(
        app.viewer()
            .open_course(&app.login(USER), COURSE)
            .await
            .unwrap(),
    );

    let (entered, gate) = backend.hold_next_create();
    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.select_lesson(lesson(1)).await }
    });
    entered.notified().await;

    let closing = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.close_session().await }
    });
    while !session.is_closed() {
        tokio::task::yield_now().await;
    }
    assert!(matches!(
        session.select_lesson(lesson(2)).await,
        Err(SessionError::InvalidState(InvalidState::Closed))
    ));

    gate.notify_one();
    pending.await.unwrap().unwrap();
    closing.await.unwrap();

    assert_eq!(backend.script().live, 0);
    assert_eq!(backend.script().disposed, 1);
    assert_eq!(session.snapshot().playback, PlaybackStatus::None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_selection_frees_the_session() {
    let repo = seeded_repo(true).await;
    let backend = ScriptedBackend::default();
    let app = services(storage_over(&repo, Arc::new(repo.clone())), &backend);
    let session = Arc::new(
        app.viewer()
            .open_course(&app.login(USER), COURSE)
            .await
            .unwrap(),
    );

    let (entered, _gate) = backend.hold_next_create();
    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.select_lesson(lesson(1)).await }
    });
    entered.notified().await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    assert_eq!(session.current_lesson(), None);
    assert!(!session.snapshot().is_busy);
    session.select_lesson(lesson(2)).await.unwrap();
    assert_eq!(backend.script().live, 1);

    drop(session);
    assert_eq!(backend.script().live, 0);
}
