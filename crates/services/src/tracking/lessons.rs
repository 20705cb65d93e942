use progress_core::accessibility::{self, LessonState, LessonStatus};
use progress_core::model::{CourseOutline, SectionId};
use tracing::{debug, info};

use super::tracker::{ProgressTracker, SkipReason, UpdateOutcome};
use crate::error::TrackerError;

/// Course lesson list on top of a [`ProgressTracker`].
///
/// Lesson states are derived from the tracker's live progress on every call.
#[derive(Debug, Clone)]
pub struct LessonTracker {
    tracker: ProgressTracker,
    outline: CourseOutline,
}

impl LessonTracker {
    #[must_use]
    pub fn new(tracker: ProgressTracker, outline: CourseOutline) -> Self {
        Self { tracker, outline }
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn outline(&self) -> &CourseOutline {
        &self.outline
    }

    /// Completed lesson ids of the active session; empty when idle.
    #[must_use]
    pub fn completed(&self) -> Vec<SectionId> {
        self.tracker
            .progress()
            .map(|progress| progress.completed_sections)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn lesson_states(&self, selected: Option<&SectionId>) -> Vec<LessonStatus> {
        accessibility::lesson_states(&self.outline, &self.completed(), selected)
    }

    #[must_use]
    pub fn lesson_state(&self, lesson: &SectionId) -> Option<LessonState> {
        accessibility::lesson_state(&self.outline, &self.completed(), lesson)
    }

    #[must_use]
    pub fn completion_percentage(&self) -> f64 {
        self.outline.completion_percentage(&self.completed())
    }

    #[must_use]
    pub fn next_lesson(&self) -> Option<SectionId> {
        accessibility::next_lesson(&self.outline, &self.completed()).cloned()
    }

    /// Record `lesson` as completed.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnknownLesson` for ids outside the outline,
    /// `TrackerError::LessonLocked` when the previous lesson is not done, and
    /// `TrackerError::Api` if the update fails.
    pub async fn complete_lesson(&self, lesson: &SectionId) -> Result<UpdateOutcome, TrackerError> {
        let Some(state) = self.lesson_state(lesson) else {
            return Err(TrackerError::UnknownLesson(lesson.clone()));
        };
        if !self.tracker.is_active() {
            return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
        }
        match state {
            LessonState::Locked => Err(TrackerError::LessonLocked(lesson.clone())),
            LessonState::Completed => {
                debug!(lesson = %lesson, "lesson already completed");
                Ok(UpdateOutcome::Skipped(SkipReason::AlreadyCompleted))
            }
            LessonState::Available | LessonState::Current => {
                info!(lesson = %lesson, "completing lesson");
                self.tracker.complete_section(lesson.clone()).await
            }
        }
    }
}
