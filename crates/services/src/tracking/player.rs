use std::time::Duration;

use progress_core::model::TrackingSessionId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tracker::{ProgressTracker, UpdateOutcome};
use crate::config::DEFAULT_SYNC_INTERVAL_SECS;
use crate::error::TrackerError;

/// Media element events the host player forwards.
///
/// Positions are playback offsets in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    Play,
    Pause,
    TimeUpdate { position: f64 },
    Seeked { position: f64 },
    Ended,
}

/// Translates player events into tracker calls.
///
/// Periodic position reports are paced by playback advancement, not wall
/// time: one report per `report_every` seconds of media played. Pacing starts
/// over whenever the tracker moves to a new session.
#[derive(Debug, Clone)]
pub struct PlaybackObserver {
    tracker: ProgressTracker,
    report_every: f64,
    last_reported: f64,
    session: Option<TrackingSessionId>,
}

impl PlaybackObserver {
    #[must_use]
    pub fn new(tracker: ProgressTracker) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let report_every = DEFAULT_SYNC_INTERVAL_SECS as f64;
        Self {
            tracker,
            report_every,
            last_reported: 0.0,
            session: None,
        }
    }

    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_every = interval.as_secs_f64();
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Where to seek when playback opens, if the learner watched before.
    ///
    /// The seek this leads to is not reported back as progress.
    pub fn resume_target(&mut self) -> Option<f64> {
        self.follow_session();
        let target = self.tracker.begin_resume_seek();
        self.last_reported = target.unwrap_or(0.0);
        target
    }

    fn follow_session(&mut self) {
        let current = self.tracker.session_id();
        if current != self.session {
            self.session = current;
            self.last_reported = 0.0;
        }
    }

    /// Handle one player event.
    ///
    /// Returns the outcome when the event led to a progress update, `None`
    /// when it only touched the watch timer or was below the report pace.
    ///
    /// # Errors
    ///
    /// Propagates `TrackerError` from the update; playback should carry on.
    pub async fn handle(&mut self, event: PlayerEvent) -> Result<Option<UpdateOutcome>, TrackerError> {
        self.follow_session();
        match event {
            PlayerEvent::Play => {
                self.tracker.start_video_watching();
                Ok(None)
            }
            PlayerEvent::Pause => {
                self.tracker.stop_video_watching();
                Ok(None)
            }
            PlayerEvent::TimeUpdate { position } => {
                if position - self.last_reported < self.report_every {
                    return Ok(None);
                }
                debug!(position, "periodic position report");
                self.last_reported = position;
                self.tracker.update_video_position(position).await.map(Some)
            }
            PlayerEvent::Seeked { position } => {
                self.last_reported = position;
                self.tracker.update_video_position(position).await.map(Some)
            }
            PlayerEvent::Ended => self.tracker.complete_content().await.map(Some),
        }
    }
}
