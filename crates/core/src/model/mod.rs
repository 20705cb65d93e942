mod ids;
mod outline;
mod progress;

pub use ids::{ContentId, ContentKey, ContentType, ParseIdError, SectionId, TrackingSessionId};
pub use outline::{CourseOutline, OutlineError, OutlineSection};
pub use progress::{FULL_PERCENTAGE, ProgressError, ProgressState};
