mod media;
mod repl;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use lesson_core::model::{CourseId, UserId};
use services::{AppServices, Clock, ViewerSettings};
use storage::repository::EnrollmentGateway;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::media::FileProbeBackend;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn parse_id(raw: &str, flag: &'static str) -> Result<u64, ArgsError> {
    raw.trim().parse().map_err(|_| ArgsError::InvalidId {
        flag,
        raw: raw.to_string(),
    })
}

fn env_id(key: &str, flag: &'static str) -> Result<Option<u64>, ArgsError> {
    std::env::var(key)
        .ok()
        .map(|value| parse_id(&value, flag))
        .transpose()
}

struct Args {
    db_url: String,
    user_id: UserId,
    course_id: CourseId,
    media_root: PathBuf,
    settings: ViewerSettings,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- view   [options]   # interactive lesson viewer");
    eprintln!("  cargo run -p app -- enroll [options]   # enroll the user in the course");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     default sqlite:dev.sqlite3");
    eprintln!("  --user-id <id>        default 1");
    eprintln!("  --course-id <id>      default 1");
    eprintln!("  --media-root <dir>    default current directory");
    eprintln!("  --no-preview          refuse unenrolled viewers");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LESSONS_DB_URL, LESSONS_USER_ID, LESSONS_COURSE_ID, LESSONS_MEDIA_ROOT,");
    eprintln!("  LESSONS_ALLOW_PREVIEW, RUST_LOG");
    eprintln!();
    eprintln!("Seed a demo course first with: cargo run -p storage --bin seed");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    View,
    Enroll,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "view" => Some(Self::View),
            "enroll" => Some(Self::Enroll),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LESSONS_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = env_id("LESSONS_USER_ID", "--user-id")?.unwrap_or(1);
        let mut course_id = env_id("LESSONS_COURSE_ID", "--course-id")?.unwrap_or(1);
        let mut media_root = std::env::var("LESSONS_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let mut settings = ViewerSettings::from_env();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user-id" => {
                    user_id = parse_id(&require_value(args, "--user-id")?, "--user-id")?;
                }
                "--course-id" => {
                    course_id = parse_id(&require_value(args, "--course-id")?, "--course-id")?;
                }
                "--media-root" => {
                    media_root = PathBuf::from(require_value(args, "--media-root")?);
                }
                "--no-preview" => settings.allow_preview = false,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id: UserId::new(user_id),
            course_id: CourseId::new(course_id),
            media_root,
            settings,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means the interactive viewer.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::View,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::View,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let clock = Clock::system();
    let backend = Arc::new(FileProbeBackend::new(parsed.media_root.clone()));
    let app = AppServices::new_sqlite(&parsed.db_url, clock, backend, parsed.settings).await?;
    let user = app.login(parsed.user_id);

    match cmd {
        Command::Enroll => {
            app.storage()
                .enrollments
                .enroll(parsed.user_id, parsed.course_id, clock.now())
                .await?;
            println!("user {} enrolled in course {}", parsed.user_id, parsed.course_id);
        }
        Command::View => {
            let session = app.viewer().open_course(&user, parsed.course_id).await?;
            info!(
                course = %parsed.course_id,
                media_root = %parsed.media_root.display(),
                access = ?session.access(),
                "viewer ready"
            );
            repl::run(
                &session,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
        }
    }

    user.logout();
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
