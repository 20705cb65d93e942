use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::SectionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress percentage must be within 0..=100, got {0}")]
    InvalidPercentage(f64),

    #[error("time spent cannot be negative, got {0}")]
    NegativeTimeSpent(f64),

    #[error("last position cannot be negative, got {0}")]
    NegativePosition(f64),

    #[error("section {0} is listed more than once")]
    DuplicateSection(SectionId),
}

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

pub const FULL_PERCENTAGE: f64 = 100.0;

/// Server-authoritative progress of one learner on one content item.
///
/// Field names follow the JSON contract of the progress endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressState {
    /// Completion measure, 0 to 100.
    pub progress_percentage: f64,
    /// Accumulated minutes, summed server-side.
    pub time_spent: f64,
    /// Last known playback offset, in seconds.
    pub last_position: f64,
    pub is_completed: bool,
    /// Completed section or lesson ids in completion order.
    pub completed_sections: Vec<SectionId>,
}

impl ProgressState {
    /// Rehydrate a progress state from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if any numeric field is out of range or a
    /// section id repeats.
    pub fn from_persisted(
        progress_percentage: f64,
        time_spent: f64,
        last_position: f64,
        is_completed: bool,
        completed_sections: Vec<SectionId>,
    ) -> Result<Self, ProgressError> {
        if !(0.0..=FULL_PERCENTAGE).contains(&progress_percentage) {
            return Err(ProgressError::InvalidPercentage(progress_percentage));
        }
        if time_spent < 0.0 {
            return Err(ProgressError::NegativeTimeSpent(time_spent));
        }
        if last_position < 0.0 {
            return Err(ProgressError::NegativePosition(last_position));
        }
        for (idx, section) in completed_sections.iter().enumerate() {
            if completed_sections[..idx].contains(section) {
                return Err(ProgressError::DuplicateSection(section.clone()));
            }
        }

        Ok(Self {
            progress_percentage,
            time_spent,
            last_position,
            is_completed: is_completed || progress_percentage >= FULL_PERCENTAGE,
            completed_sections,
        })
    }

    /// Coerce a state received over the wire into range.
    ///
    /// Percentages are clamped to 0..=100, negative or non-finite numbers become
    /// zero, repeated sections keep their first occurrence, and a full
    /// percentage marks the item completed.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.progress_percentage = finite_or_zero(self.progress_percentage).clamp(0.0, FULL_PERCENTAGE);
        self.time_spent = finite_or_zero(self.time_spent).max(0.0);
        self.last_position = finite_or_zero(self.last_position).max(0.0);
        if self.progress_percentage >= FULL_PERCENTAGE {
            self.is_completed = true;
        }

        let mut seen = Vec::with_capacity(self.completed_sections.len());
        self.completed_sections.retain(|section| {
            if seen.contains(section) {
                false
            } else {
                seen.push(section.clone());
                true
            }
        });
        self
    }

    #[must_use]
    pub fn is_section_completed(&self, section: &SectionId) -> bool {
        self.completed_sections.contains(section)
    }

    /// Position to resume playback from, if any playback was recorded.
    #[must_use]
    pub fn resume_position(&self) -> Option<f64> {
        (self.last_position > 0.0).then_some(self.last_position)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
