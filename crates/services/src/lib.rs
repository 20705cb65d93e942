#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod tracking;

pub use progress_core::Clock;

pub use api::{HttpProgressApi, InMemoryProgressApi, ProgressApi, ProgressPatch, ProgressUpdate};
pub use config::TrackerConfig;
pub use error::{ApiError, ConfigError, TrackerError};
pub use tracking::{
    LessonTracker, LoadedProgress, PlaybackObserver, PlayerEvent, ProgressTracker, SkipReason,
    UpdateOutcome,
};
