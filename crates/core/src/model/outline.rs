use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::SectionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutlineError {
    #[error("lesson {0} appears more than once in the outline")]
    DuplicateLesson(SectionId),
}

/// One section of a course and its lessons, in teaching order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    #[serde(default)]
    pub title: Option<String>,
    pub lessons: Vec<SectionId>,
}

/// Ordered sections of a course.
///
/// Lesson ids are unique across the whole outline, so a lesson's predecessor
/// is well defined even across section boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseOutline {
    sections: Vec<OutlineSection>,
}

impl CourseOutline {
    /// Build an outline from sections.
    ///
    /// # Errors
    ///
    /// Returns `OutlineError::DuplicateLesson` if a lesson id repeats.
    pub fn new(sections: Vec<OutlineSection>) -> Result<Self, OutlineError> {
        let mut seen: Vec<&SectionId> = Vec::new();
        for lesson in sections.iter().flat_map(|section| section.lessons.iter()) {
            if seen.contains(&lesson) {
                return Err(OutlineError::DuplicateLesson(lesson.clone()));
            }
            seen.push(lesson);
        }
        Ok(Self { sections })
    }

    /// Convenience constructor from untitled sections of lesson ids.
    ///
    /// # Errors
    ///
    /// Returns `OutlineError::DuplicateLesson` if a lesson id repeats.
    pub fn from_lesson_ids<S, L>(sections: S) -> Result<Self, OutlineError>
    where
        S: IntoIterator<Item = L>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let sections = sections
            .into_iter()
            .map(|lessons| OutlineSection {
                title: None,
                lessons: lessons.into_iter().map(SectionId::new).collect(),
            })
            .collect();
        Self::new(sections)
    }

    #[must_use]
    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    /// All lessons flattened in teaching order.
    pub fn lessons(&self) -> impl Iterator<Item = &SectionId> {
        self.sections.iter().flat_map(|section| section.lessons.iter())
    }

    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.lessons().count()
    }

    #[must_use]
    pub fn contains(&self, lesson: &SectionId) -> bool {
        self.lessons().any(|candidate| candidate == lesson)
    }

    /// Share of outline lessons found in `completed`, 0 to 100.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_percentage(&self, completed: &[SectionId]) -> f64 {
        let total = self.lesson_count();
        if total == 0 {
            return 0.0;
        }
        let done = self.lessons().filter(|lesson| completed.contains(lesson)).count();
        done as f64 * 100.0 / total as f64
    }
}

impl<'de> Deserialize<'de> for CourseOutline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            sections: Vec<OutlineSection>,
        }

        let raw = Raw::deserialize(deserializer)?;
        CourseOutline::new(raw.sections).map_err(serde::de::Error::custom)
    }
}
