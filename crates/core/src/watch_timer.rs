use chrono::{DateTime, Duration, Utc};

use crate::time::duration_to_minutes;

/// Wall-clock watch-time accumulator for one viewing session.
///
/// Time is supplied by the caller, so the timer itself never reads a clock.
/// Intervals are plain `now - started_at`; a clock that steps backwards
/// contributes nothing rather than a negative span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchTimer {
    started_at: Option<DateTime<Utc>>,
    accumulated: Duration,
}

impl WatchTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a playing interval.
    ///
    /// Returns `false` and keeps the original start if an interval is
    /// already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    /// Close the running interval and add it to the accumulator.
    ///
    /// Returns the closed interval, or `None` if nothing was running.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        let started_at = self.started_at.take()?;
        let elapsed = non_negative(now - started_at);
        self.accumulated += elapsed;
        Some(elapsed)
    }

    /// Drain everything not yet synced: the accumulator plus the running
    /// interval so far. A running interval is restarted at `now`, so the next
    /// drain does not count the same span twice.
    pub fn take_unsynced(&mut self, now: DateTime<Utc>) -> Duration {
        let mut delta = std::mem::replace(&mut self.accumulated, Duration::zero());
        if let Some(started_at) = self.started_at {
            delta += non_negative(now - started_at);
            self.started_at = Some(now);
        }
        delta
    }

    /// Return a previously drained span to the accumulator.
    pub fn credit(&mut self, span: Duration) {
        self.accumulated += non_negative(span);
    }

    /// Forget all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Closed intervals only; a running interval is excluded.
    #[must_use]
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    #[must_use]
    pub fn accumulated_minutes(&self) -> f64 {
        duration_to_minutes(self.accumulated)
    }
}

fn non_negative(span: Duration) -> Duration {
    span.max(Duration::zero())
}
