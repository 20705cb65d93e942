use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use progress_core::ManualClock;
use progress_core::model::ProgressState;
use serde::Deserialize;
use services::{PlaybackObserver, PlayerEvent, ProgressTracker, TrackerError, UpdateOutcome};
use tracing::{info, warn};

/// One entry of a recorded player script.
///
/// `afterMs` is the wall time elapsed since the previous entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    #[serde(default)]
    pub after_ms: i64,
    #[serde(flatten)]
    pub event: PlayerEvent,
}

pub fn load_script(path: &Path) -> anyhow::Result<Vec<ReplayStep>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading event script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing event script {}", path.display()))
}

/// Feed `steps` through `observer`, advancing `clock` between them.
///
/// Failed updates are logged and playback carries on, as a player would.
pub async fn run(
    observer: &mut PlaybackObserver,
    clock: &ManualClock,
    steps: &[ReplayStep],
) -> Vec<UpdateOutcome> {
    let mut outcomes = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        clock.advance(Duration::milliseconds(step.after_ms.max(0)));
        match observer.handle(step.event).await {
            Ok(Some(outcome)) => {
                info!(step = index, event = ?step.event, outcome = ?outcome, "replayed event");
                outcomes.push(outcome);
            }
            Ok(None) => {}
            Err(err) => warn!(step = index, event = ?step.event, error = %err, "update failed"),
        }
    }
    outcomes
}

/// Close the session and return the last known progress.
///
/// The flush response wins when there was watch time left to send; otherwise
/// the progress applied before closing is returned.
pub async fn finish(tracker: &ProgressTracker) -> Result<Option<ProgressState>, TrackerError> {
    let last = tracker.progress();
    let flushed = tracker.stop_session().await?;
    Ok(flushed.or(last))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use progress_core::model::ContentKey;
    use progress_core::time::fixed_now;
    use services::{Clock, InMemoryProgressApi, ProgressTracker};

    use super::*;

    #[test]
    fn steps_parse_with_optional_delay() {
        let steps: Vec<ReplayStep> = serde_json::from_str(
            r#"[{"event": "play"}, {"afterMs": 30000, "event": "time_update", "position": 30}]"#,
        )
        .unwrap();
        assert_eq!(steps[0].after_ms, 0);
        assert_eq!(steps[1].event, PlayerEvent::TimeUpdate { position: 30.0 });
    }

    #[tokio::test]
    async fn replay_accumulates_watch_time_on_the_manual_clock() {
        let api = InMemoryProgressApi::new();
        let clock = ManualClock::new(fixed_now());
        let tracker =
            ProgressTracker::new(Arc::new(api.clone())).with_clock(Clock::manual(&clock));
        let key = ContentKey::tutorial("t1");
        tracker.start_session(key.clone()).await.unwrap();
        let mut observer = PlaybackObserver::new(tracker.clone());

        let steps: Vec<ReplayStep> = serde_json::from_str(
            r#"[
                {"event": "play"},
                {"afterMs": 60000, "event": "pause"},
                {"afterMs": 5000, "event": "play"},
                {"afterMs": 60000, "event": "ended"}
            ]"#,
        )
        .unwrap();
        let outcomes = run(&mut observer, &clock, &steps).await;

        assert_eq!(outcomes.len(), 1);
        let progress = api.progress_of(&key).unwrap();
        assert!((progress.time_spent - 2.0).abs() < 1e-9);
        assert!(progress.is_completed);
    }

    #[tokio::test]
    async fn finish_reports_progress_when_nothing_is_left_to_flush() {
        let api = InMemoryProgressApi::new();
        let clock = ManualClock::new(fixed_now());
        let tracker =
            ProgressTracker::new(Arc::new(api.clone())).with_clock(Clock::manual(&clock));
        tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();
        let mut observer = PlaybackObserver::new(tracker.clone());

        let steps: Vec<ReplayStep> = serde_json::from_str(
            r#"[{"event": "play"}, {"afterMs": 120000, "event": "ended"}]"#,
        )
        .unwrap();
        run(&mut observer, &clock, &steps).await;

        let progress = finish(&tracker).await.unwrap().unwrap();
        assert!(progress.is_completed);
        assert!((progress.time_spent - 2.0).abs() < 1e-9);
        assert!(!tracker.is_active());
        assert_eq!(api.updates().len(), 1);
    }

    #[tokio::test]
    async fn finish_prefers_the_flush_response() {
        let api = InMemoryProgressApi::new();
        let clock = ManualClock::new(fixed_now());
        let tracker =
            ProgressTracker::new(Arc::new(api.clone())).with_clock(Clock::manual(&clock));
        tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();
        tracker.start_video_watching();
        clock.advance(Duration::minutes(3));

        let progress = finish(&tracker).await.unwrap().unwrap();
        assert!((progress.time_spent - 3.0).abs() < 1e-9);
    }
}
