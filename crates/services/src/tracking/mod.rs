//! Session control, progress sync, and the consumers that drive them.

mod lessons;
mod player;
mod state;
mod tracker;

pub use lessons::LessonTracker;
pub use player::{PlaybackObserver, PlayerEvent};
pub use tracker::{LoadedProgress, ProgressTracker, SkipReason, UpdateOutcome};
