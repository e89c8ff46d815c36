//! Line-oriented front end for one lesson session.

use std::fmt::Write as _;
use std::io;

use lesson_core::model::LessonId;
use services::{
    LessonSessionController, PlaybackStatus, SelectOutcome, SessionError, SessionSignal,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    List,
    Select(LessonId),
    Complete(Option<LessonId>),
    Next,
    Previous,
    Status,
    Help,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let id = words.next().map(parse_lesson_id).transpose()?;
        let input = match (head, id) {
            ("list" | "ls", None) => Self::List,
            ("select" | "open", Some(id)) => Self::Select(id),
            ("select" | "open", None) => return Err(format!("{head} needs a lesson id")),
            ("complete" | "done", id) => Self::Complete(id),
            ("next" | "n", None) => Self::Next,
            ("prev" | "p", None) => Self::Previous,
            ("status" | "summary", None) => Self::Status,
            ("help" | "?", None) => Self::Help,
            ("quit" | "exit" | "q", None) => Self::Quit,
            _ => return Err(format!("unknown command: {}", line.trim())),
        };
        Ok(Some(input))
    }
}

fn parse_lesson_id(raw: &str) -> Result<LessonId, String> {
    raw.parse()
        .map_err(|_| format!("invalid lesson id: {raw}"))
}

const HELP: &str = "\
commands:
  list              lessons with progress
  select <id>       open a lesson
  next | prev       open the adjacent lesson
  complete [<id>]   mark the current (or given) lesson complete
  status            current lesson, playback and progress
  quit
";

/// Read commands until `quit` or end of input, then close the session.
///
/// The session is closed on every exit path, including I/O failures.
///
/// # Errors
///
/// Returns an I/O error if reading input or writing output fails. Session
/// errors are reported to the user and do not end the loop.
pub async fn run<R, W>(
    session: &LessonSessionController,
    input: R,
    mut output: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = command_loop(session, input, &mut output).await;
    session.close_session().await;
    result?;
    output.write_all(b"bye\n").await?;
    output.flush().await
}

async fn command_loop<R, W>(
    session: &LessonSessionController,
    input: R,
    output: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut signals = session.subscribe();
    let mut lines = input.lines();

    output.write_all(render_list(session).as_bytes()).await?;
    output.write_all(b"> ").await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = match Input::parse(&line) {
            Ok(None) => String::new(),
            Ok(Some(Input::Quit)) => break,
            Ok(Some(input)) => execute(session, input).await,
            Err(message) => format!("{message}\n"),
        };
        output.write_all(text.as_bytes()).await?;
        output.write_all(drain_signals(&mut signals).as_bytes()).await?;
        output.write_all(b"> ").await?;
        output.flush().await?;
    }
    Ok(())
}

async fn execute(session: &LessonSessionController, input: Input) -> String {
    match input {
        Input::List => render_list(session),
        Input::Select(id) => render_select(session.select_lesson(id).await),
        Input::Next => match session.next_lesson() {
            Some(id) => render_select(session.select_lesson(id).await),
            None => "already at the last lesson\n".to_owned(),
        },
        Input::Previous => match session.previous_lesson() {
            Some(id) => render_select(session.select_lesson(id).await),
            None => "already at the first lesson\n".to_owned(),
        },
        Input::Complete(id) => {
            let result = match id {
                Some(id) => session.complete_lesson(id).await,
                None => session.mark_current_complete().await,
            };
            match result {
                Ok(done) if done.newly_completed => {
                    format!("lesson {} complete, progress {}\n", done.lesson_id, done.summary)
                }
                Ok(done) => format!("lesson {} was already complete\n", done.lesson_id),
                Err(err) => render_error(&err),
            }
        }
        Input::Status => render_status(session),
        Input::Help => HELP.to_owned(),
        Input::Quit => String::new(),
    }
}

fn render_list(session: &LessonSessionController) -> String {
    let current = session.current_lesson();
    let mut out = String::new();
    for lesson in session.lessons() {
        let marker = if Some(lesson.id()) == current { '>' } else { ' ' };
        let done = session
            .progress_of(lesson.id())
            .is_some_and(|p| p.is_completed());
        let _ = write!(
            out,
            "{marker} [{}] {}. {}",
            lesson.id(),
            lesson.position(),
            lesson.title()
        );
        if done {
            out.push_str(" (done)");
        }
        if lesson.is_preview() {
            out.push_str(" (preview)");
        }
        if lesson.media().is_none() {
            out.push_str(" (no video)");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "progress {}", session.summary());
    out
}

fn render_select(result: Result<SelectOutcome, SessionError>) -> String {
    match result {
        Ok(outcome) => format!(
            "lesson {} open, {}\n",
            outcome.lesson_id,
            render_playback(&outcome.playback)
        ),
        Err(err) => render_error(&err),
    }
}

fn render_status(session: &LessonSessionController) -> String {
    let snapshot = session.snapshot();
    let current = snapshot
        .current_lesson
        .map_or_else(|| "none".to_owned(), |id| id.to_string());
    let mut out = format!(
        "current lesson {current}, {}, progress {}",
        render_playback(&snapshot.playback),
        snapshot.summary
    );
    if snapshot.is_busy {
        out.push_str(" (busy)");
    }
    out.push('\n');
    out
}

fn render_playback(status: &PlaybackStatus) -> String {
    match status {
        PlaybackStatus::None => "no video".to_owned(),
        PlaybackStatus::Ready(media) => format!("playing {media}"),
        PlaybackStatus::Unavailable(cause) => format!("video unavailable: {}", cause.cause),
    }
}

fn render_error(err: &SessionError) -> String {
    format!("error: {err}\n")
}

fn drain_signals(signals: &mut broadcast::Receiver<SessionSignal>) -> String {
    let mut out = String::new();
    loop {
        match signals.try_recv() {
            Ok(SessionSignal::CourseCompleted(summary)) => {
                let _ = writeln!(out, "*** course complete: {summary} ***");
            }
            // Already shown by the select output.
            Ok(SessionSignal::PlaybackUnavailable(_)) => {}
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    out
}
