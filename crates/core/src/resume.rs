use chrono::{DateTime, Duration, Utc};

/// Default window during which position reports are ignored after the
/// programmatic resume-seek.
pub const DEFAULT_RESUME_GUARD_MS: i64 = 100;

/// Suppresses position reports caused by the initial seek-to-resume.
///
/// The host seeks to the stored position once when playback opens; that seek
/// fires the same events as a user seek but must not be persisted as new
/// progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeGuard {
    window: Duration,
    armed_until: Option<DateTime<Utc>>,
}

impl ResumeGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed_until: None,
        }
    }

    /// Arm the guard for one window starting at `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.armed_until = Some(now + self.window);
    }

    /// Whether position reports at `now` must be dropped.
    ///
    /// An expired guard disarms itself.
    pub fn suppresses(&mut self, now: DateTime<Utc>) -> bool {
        match self.armed_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.armed_until = None;
                false
            }
            None => false,
        }
    }

    pub fn disarm(&mut self) {
        self.armed_until = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed_until.is_some()
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for ResumeGuard {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_RESUME_GUARD_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn suppresses_only_inside_window() {
        let mut guard = ResumeGuard::default();
        let now = fixed_now();
        assert!(!guard.suppresses(now));

        guard.arm(now);
        assert!(guard.suppresses(now + Duration::milliseconds(50)));
        assert!(!guard.suppresses(now + Duration::milliseconds(100)));
        assert!(!guard.is_armed());
    }

    #[test]
    fn disarm_clears_immediately() {
        let mut guard = ResumeGuard::new(Duration::seconds(5));
        guard.arm(fixed_now());
        guard.disarm();
        assert!(!guard.suppresses(fixed_now()));
    }
}
