use serde::{Deserialize, Serialize};

use crate::model::{CourseOutline, SectionId};

//
// ─── LESSON STATE ──────────────────────────────────────────────────────────────
//

/// Rendered state of one lesson in a course lesson list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonState {
    Locked,
    Available,
    Current,
    Completed,
}

impl LessonState {
    /// Whether the learner may open the lesson.
    #[must_use]
    pub fn is_accessible(self) -> bool {
        !matches!(self, LessonState::Locked)
    }
}

/// A lesson paired with its derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonStatus {
    pub lesson_id: SectionId,
    pub section_index: usize,
    pub state: LessonState,
}

//
// ─── DERIVATION ────────────────────────────────────────────────────────────────
//

/// Derive every lesson's state from the outline and the completed ids.
///
/// Rules, applied in teaching order across section boundaries:
///
/// * a lesson listed in `completed` is `Completed`, whatever its position;
/// * the first lesson of the outline is always accessible;
/// * any other lesson is accessible only if the lesson right before it is
///   completed;
/// * an accessible lesson that is not completed is `Current` when it is the
///   `selected` one and `Available` otherwise.
///
/// Nothing is cached; call again whenever `completed` changes.
///
/// # Examples
///
/// ```
/// # use progress_core::accessibility::{lesson_states, LessonState};
/// # use progress_core::model::{CourseOutline, SectionId};
/// let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"], vec!["L3"]]).unwrap();
/// let states = lesson_states(&outline, &[SectionId::new("L1")], None);
/// let states: Vec<_> = states.iter().map(|s| s.state).collect();
/// assert_eq!(
///     states,
///     [LessonState::Completed, LessonState::Available, LessonState::Locked]
/// );
/// ```
#[must_use]
pub fn lesson_states(
    outline: &CourseOutline,
    completed: &[SectionId],
    selected: Option<&SectionId>,
) -> Vec<LessonStatus> {
    let mut statuses = Vec::with_capacity(outline.lesson_count());
    let mut previous_completed = true;

    for (section_index, section) in outline.sections().iter().enumerate() {
        for lesson in &section.lessons {
            let is_completed = completed.contains(lesson);
            let state = if is_completed {
                LessonState::Completed
            } else if !previous_completed {
                LessonState::Locked
            } else if selected == Some(lesson) {
                LessonState::Current
            } else {
                LessonState::Available
            };

            statuses.push(LessonStatus {
                lesson_id: lesson.clone(),
                section_index,
                state,
            });
            previous_completed = is_completed;
        }
    }

    statuses
}

/// State of a single lesson, or `None` if it is not part of the outline.
#[must_use]
pub fn lesson_state(
    outline: &CourseOutline,
    completed: &[SectionId],
    lesson: &SectionId,
) -> Option<LessonState> {
    lesson_states(outline, completed, None)
        .into_iter()
        .find(|status| &status.lesson_id == lesson)
        .map(|status| status.state)
}

/// The first accessible lesson that is not yet completed.
#[must_use]
pub fn next_lesson<'a>(outline: &'a CourseOutline, completed: &[SectionId]) -> Option<&'a SectionId> {
    let mut previous_completed = true;
    for lesson in outline.lessons() {
        let is_completed = completed.contains(lesson);
        if !is_completed && previous_completed {
            return Some(lesson);
        }
        previous_completed = is_completed;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<SectionId> {
        raw.iter().map(|id| SectionId::new(*id)).collect()
    }

    fn states(outline: &CourseOutline, completed: &[&str], selected: Option<&str>) -> Vec<LessonState> {
        let selected = selected.map(SectionId::new);
        lesson_states(outline, &ids(completed), selected.as_ref())
            .into_iter()
            .map(|status| status.state)
            .collect()
    }

    #[test]
    fn first_lesson_is_always_open() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"], vec!["L3"]]).unwrap();
        assert_eq!(
            states(&outline, &[], None),
            [LessonState::Available, LessonState::Locked, LessonState::Locked]
        );
        assert_eq!(
            states(&outline, &[], Some("L1")),
            [LessonState::Current, LessonState::Locked, LessonState::Locked]
        );
    }

    #[test]
    fn completion_unlocks_next_lesson_only() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"], vec!["L3"]]).unwrap();
        assert_eq!(
            states(&outline, &["L1"], None),
            [LessonState::Completed, LessonState::Available, LessonState::Locked]
        );
    }

    #[test]
    fn unlocking_crosses_section_boundaries() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"], vec!["L3", "L4"]]).unwrap();
        assert_eq!(
            states(&outline, &["L1", "L2"], Some("L3")),
            [
                LessonState::Completed,
                LessonState::Completed,
                LessonState::Current,
                LessonState::Locked
            ]
        );
    }

    #[test]
    fn empty_sections_do_not_break_the_chain() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1"], vec![], vec!["L2"]]).unwrap();
        assert_eq!(
            states(&outline, &["L1"], None),
            [LessonState::Completed, LessonState::Available]
        );
    }

    #[test]
    fn out_of_order_completion_still_renders_completed() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2", "L3"]]).unwrap();
        assert_eq!(
            states(&outline, &["L2"], None),
            [LessonState::Available, LessonState::Completed, LessonState::Available]
        );
    }

    #[test]
    fn selecting_a_locked_lesson_keeps_it_locked() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"]]).unwrap();
        assert_eq!(
            states(&outline, &[], Some("L2")),
            [LessonState::Available, LessonState::Locked]
        );
    }

    #[test]
    fn next_lesson_follows_sequence() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1", "L2"], vec!["L3"]]).unwrap();
        assert_eq!(next_lesson(&outline, &ids(&["L1"])), Some(&SectionId::new("L2")));
        assert_eq!(next_lesson(&outline, &ids(&["L1", "L2", "L3"])), None);
    }

    #[test]
    fn lesson_state_of_unknown_lesson_is_none() {
        let outline = CourseOutline::from_lesson_ids([vec!["L1"]]).unwrap();
        assert_eq!(lesson_state(&outline, &[], &SectionId::new("nope")), None);
        assert_eq!(
            lesson_state(&outline, &[], &SectionId::new("L1")),
            Some(LessonState::Available)
        );
    }
}
