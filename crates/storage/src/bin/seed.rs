use std::fmt;

use chrono::{DateTime, Utc};
use lesson_core::model::{CourseId, LessonDraft, LessonId, MediaRef, UserId};
use storage::repository::{CourseRecord, Storage};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    course_title: String,
    user_id: Option<UserId>,
    lessons: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidLessons { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(flag: &'static str, raw: String) -> Result<u64, ArgsError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ArgsError::InvalidId { flag, raw })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LESSONS_DB_URL")
            .unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into());
        let mut course_id = std::env::var("LESSONS_COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| CourseId::new(1), CourseId::new);
        let mut course_title =
            std::env::var("LESSONS_COURSE_TITLE").unwrap_or_else(|_| "Intro to Rust".into());
        let mut user_id = std::env::var("LESSONS_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(UserId::new);
        let mut lessons = 4;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    course_id = CourseId::new(parse_id("--course-id", value)?);
                }
                "--course-title" => {
                    course_title = require_value(&mut args, "--course-title")?;
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    user_id = Some(UserId::new(parse_id("--user-id", value)?));
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            course_title,
            user_id,
            lessons,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3?mode=rwc)");
    eprintln!("  --course-id <id>          Course id to upsert (default: 1)");
    eprintln!("  --course-title <title>    Course title (default: Intro to Rust)");
    eprintln!("  --user-id <id>            Enroll this user in the course");
    eprintln!("  --lessons <n>             Number of lessons to upsert (default: 4)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  LESSONS_DB_URL, LESSONS_COURSE_ID, LESSONS_COURSE_TITLE, LESSONS_USER_ID");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    storage
        .catalog
        .upsert_course(&CourseRecord {
            id: args.course_id,
            title: args.course_title.clone(),
        })
        .await?;

    // Every third lesson is a reading without video; the first is a free preview.
    let base = args.course_id.value().saturating_mul(1_000);
    for i in 0..args.lessons {
        let position = i + 1;
        let mut draft = LessonDraft::new(position, format!("Lesson {position}"))
            .with_description(format!("Part {position} of {}", args.course_title))
            .preview(i == 0);
        if position % 3 != 0 {
            draft = draft
                .with_media(MediaRef::parse(format!("lesson-{position}.mp4"))?)
                .with_duration_minutes(5 + position);
        }
        let lesson = draft.validate(LessonId::new(base + u64::from(position)), args.course_id)?;
        storage.catalog.upsert_lesson(&lesson).await?;
    }

    if let Some(user_id) = args.user_id {
        storage
            .enrollments
            .enroll(user_id, args.course_id, now)
            .await?;
    }

    println!(
        "Seeded course {} with {} lessons into {}{}",
        args.course_id,
        args.lessons,
        args.db_url,
        args.user_id
            .map(|u| format!(" (enrolled user {u})"))
            .unwrap_or_default()
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
