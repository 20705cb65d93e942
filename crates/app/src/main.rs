//! `progress`: command-line client for the learning progress endpoints.

mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use progress_core::ManualClock;
use progress_core::model::{ContentId, ContentKey, ContentType, CourseOutline, SectionId};
use serde_json::json;
use services::config::parse_base_url;
use services::{
    Clock, HttpProgressApi, LessonTracker, LoadedProgress, PlaybackObserver, ProgressTracker,
    TrackerConfig,
};
use storage::repository::{Storage, TokenRepository};
use tracing::info;

#[derive(Parser)]
#[command(name = "progress")]
#[command(about = "Track and inspect course and tutorial progress")]
struct Cli {
    /// SQLite database holding the bearer token and the progress cache
    #[arg(long, env = "PROGRESS_DB_URL", default_value = "sqlite://progress.sqlite3")]
    db: String,

    /// Progress API base URL (overrides PROGRESS_API_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the bearer token sent with every request
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored token
    Logout,
    /// Print stored progress, from the cache when the service is unreachable
    Show {
        content_type: ContentType,
        content_id: ContentId,
    },
    /// Print lesson states of a course, optionally completing one first
    Lessons {
        /// JSON outline: {"sections": [{"title": "...", "lessons": ["L1", ...]}]}
        #[arg(long)]
        outline: PathBuf,
        content_id: ContentId,
        #[arg(long)]
        complete: Option<SectionId>,
        #[arg(long)]
        selected: Option<SectionId>,
    },
    /// Drive a tracking session from a recorded player event script
    Replay {
        #[arg(long)]
        events: PathBuf,
        content_type: ContentType,
        content_id: ContentId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TrackerConfig::from_env()?;
    if let Some(raw) = &cli.base_url {
        config = config.with_base_url(parse_base_url(raw)?);
    }

    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    match cli.command {
        Command::Login { token } => {
            if token.trim().is_empty() {
                bail!("token must not be empty");
            }
            storage.tokens.save_token(token.trim()).await?;
            info!("token stored");
        }
        Command::Logout => {
            storage.tokens.clear_token().await?;
            info!("token cleared");
        }
        Command::Show {
            content_type,
            content_id,
        } => {
            let tracker = tracker(&config, &storage, Clock::default_clock())?;
            let key = ContentKey {
                content_type,
                content_id,
            };
            let loaded = tracker.load_progress(&key).await?;
            let source = match &loaded {
                LoadedProgress::Live(_) => "live".to_string(),
                LoadedProgress::Cached(cached) => format!("cached at {}", cached.updated_at),
            };
            print_json(&json!({
                "content": key.to_string(),
                "source": source,
                "progress": loaded.progress(),
            }))?;
        }
        Command::Lessons {
            outline,
            content_id,
            complete,
            selected,
        } => {
            let outline = load_outline(&outline)?;
            let tracker = tracker(&config, &storage, Clock::default_clock())?;
            let lessons = LessonTracker::new(tracker.clone(), outline);
            tracker
                .start_session(ContentKey {
                    content_type: ContentType::Course,
                    content_id,
                })
                .await?;

            if let Some(lesson) = &complete {
                let outcome = lessons.complete_lesson(lesson).await?;
                info!(lesson = %lesson, outcome = ?outcome, "lesson completion");
            }

            print_json(&json!({
                "lessons": lessons.lesson_states(selected.as_ref()),
                "completionPercentage": lessons.completion_percentage(),
                "nextLesson": lessons.next_lesson(),
            }))?;
            tracker.stop_session().await?;
        }
        Command::Replay {
            events,
            content_type,
            content_id,
        } => {
            let steps = replay::load_script(&events)?;
            let clock = ManualClock::new(Utc::now());
            let tracker = tracker(&config, &storage, Clock::manual(&clock))?;
            tracker
                .start_session(ContentKey {
                    content_type,
                    content_id,
                })
                .await?;

            let mut observer = PlaybackObserver::new(tracker.clone())
                .with_report_interval(config.sync_interval);
            if let Some(target) = observer.resume_target() {
                info!(target, "resuming playback");
            }
            let outcomes = replay::run(&mut observer, &clock, &steps).await;
            let progress = replay::finish(&tracker).await?;

            print_json(&json!({
                "updates": outcomes.len(),
                "progress": progress,
                "lastError": tracker.last_error(),
            }))?;
        }
    }

    Ok(())
}

fn tracker(config: &TrackerConfig, storage: &Storage, clock: Clock) -> anyhow::Result<ProgressTracker> {
    let api = HttpProgressApi::new(config, Arc::clone(&storage.tokens))?;
    Ok(ProgressTracker::new(Arc::new(api))
        .with_config(config)
        .with_clock(clock)
        .with_cache(Arc::clone(&storage.progress)))
}

fn load_outline(path: &Path) -> anyhow::Result<CourseOutline> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading outline {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing outline {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
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
