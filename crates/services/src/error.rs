//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::{ContentKey, SectionId};
use storage::repository::StorageError;

/// Errors emitted by `ProgressApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("progress request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("progress service rejected the request: {0}")]
    Rejected(String),
    #[error("progress response carried no progress")]
    EmptyResponse,
    #[error("base url cannot carry endpoint paths: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressTracker` and its consumers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("session start for {0} was superseded")]
    Superseded(ContentKey),
    #[error("no tracking session is active")]
    Inactive,
    #[error("lesson {0} is not part of this course")]
    UnknownLesson(SectionId),
    #[error("lesson {0} is locked")]
    LessonLocked(SectionId),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted while reading `TrackerConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("base url cannot carry endpoint paths: {0}")]
    CannotBeABase(String),
}
