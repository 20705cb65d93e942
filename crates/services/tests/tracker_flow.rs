use std::sync::Arc;

use chrono::Duration;
use progress_core::ManualClock;
use progress_core::model::{ContentKey, ProgressState, SectionId};
use progress_core::time::fixed_now;
use services::api::RecordedRequest;
use services::{
    Clock, InMemoryProgressApi, ProgressPatch, ProgressTracker, SkipReason, TrackerError,
    UpdateOutcome,
};
use storage::repository::{InMemoryRepository, ProgressCacheRepository};

fn tracker_on(api: &InMemoryProgressApi) -> (ProgressTracker, ManualClock) {
    let clock = ManualClock::new(fixed_now());
    let tracker = ProgressTracker::new(Arc::new(api.clone())).with_clock(Clock::manual(&clock));
    (tracker, clock)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn watched_minutes_reach_the_server_once() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    let key = ContentKey::tutorial("t1");

    tracker.start_session(key.clone()).await.unwrap();
    assert!(tracker.start_video_watching());
    clock.advance(Duration::minutes(2));
    assert!(close(tracker.stop_video_watching().unwrap(), 2.0));

    let outcome = tracker.update_progress(ProgressPatch::default()).await.unwrap();
    assert!(close(outcome.applied().unwrap().time_spent, 2.0));

    let updates = api.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].time_spent_minutes, Some(2.0));
    assert!(close(tracker.unsynced_watch_minutes(), 0.0));
}

#[tokio::test]
async fn running_interval_is_excluded_from_closed_total() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();

    tracker.start_video_watching();
    clock.advance(Duration::seconds(90));
    tracker.stop_video_watching();
    tracker.start_video_watching();
    clock.advance(Duration::seconds(30));
    tracker.stop_video_watching();
    tracker.start_video_watching();
    clock.advance(Duration::minutes(5));

    assert!(tracker.is_watching());
    assert!(close(tracker.unsynced_watch_minutes(), 2.0));
}

#[tokio::test]
async fn update_without_session_sends_nothing() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);

    let outcome = tracker
        .update_progress(ProgressPatch::default().position(12.0))
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::Inactive));
    assert_eq!(api.request_count(), 0);
    assert!(tracker.progress().is_none());
    assert!(tracker.last_error().is_none());
}

#[tokio::test]
async fn complete_content_stops_timer_and_reaches_full() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    tracker.start_session(ContentKey::course("c1")).await.unwrap();

    tracker.start_video_watching();
    clock.advance(Duration::seconds(30));
    let outcome = tracker.complete_content().await.unwrap();

    let progress = outcome.applied().unwrap();
    assert!(close(progress.progress_percentage, 100.0));
    assert!(progress.is_completed);
    assert!(!tracker.is_watching());
    assert_eq!(api.updates()[0].time_spent_minutes, Some(0.5));
}

#[tokio::test]
async fn resume_seek_position_is_not_reported() {
    let key = ContentKey::tutorial("t1");
    let api = InMemoryProgressApi::new().with_progress(
        key.clone(),
        ProgressState {
            last_position: 120.0,
            ..ProgressState::default()
        },
    );
    let (tracker, clock) = tracker_on(&api);
    tracker.start_session(key).await.unwrap();

    assert_eq!(tracker.begin_resume_seek(), Some(120.0));
    let outcome = tracker.update_video_position(120.0).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::ResumeSeek));
    assert!(api.updates().is_empty());

    clock.advance(Duration::milliseconds(150));
    let outcome = tracker.update_video_position(121.4).await.unwrap();
    assert!(close(outcome.applied().unwrap().last_position, 121.0));
    assert_eq!(api.updates().len(), 1);
}

#[tokio::test]
async fn stopping_twice_flushes_once() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();

    tracker.start_video_watching();
    clock.advance(Duration::minutes(1));

    let flushed = tracker.stop_session().await.unwrap().unwrap();
    assert!(close(flushed.time_spent, 1.0));
    assert!(tracker.stop_session().await.unwrap().is_none());
    assert!(!tracker.is_active());
    assert_eq!(api.updates().len(), 1);
}

#[tokio::test]
async fn stale_response_does_not_overwrite_newer_one() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);
    tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();

    let gate = api.hold_next_update();
    let slow = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            tracker
                .update_progress(ProgressPatch::default().position(10.0))
                .await
        }
    });
    while api.updates().is_empty() {
        tokio::task::yield_now().await;
    }

    let fast = tracker
        .update_progress(ProgressPatch::default().position(20.0))
        .await
        .unwrap();
    assert!(close(fast.applied().unwrap().last_position, 20.0));

    gate.release();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow, UpdateOutcome::Stale);
    assert!(close(tracker.progress().unwrap().last_position, 20.0));
}

#[tokio::test]
async fn failed_update_keeps_watch_time_and_sets_error() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();

    tracker.start_video_watching();
    clock.advance(Duration::minutes(1));
    tracker.stop_video_watching();

    api.fail_next(1);
    let err = tracker.update_progress(ProgressPatch::default()).await.unwrap_err();
    assert!(matches!(err, TrackerError::Api(_)));
    assert!(tracker.last_error().is_some());
    assert!(close(tracker.unsynced_watch_minutes(), 1.0));

    tracker.update_progress(ProgressPatch::default()).await.unwrap();
    assert!(tracker.last_error().is_none());
    let updates = api.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].time_spent_minutes, Some(1.0));
}

#[tokio::test]
async fn failed_start_leaves_tracker_idle() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);
    api.fail_next(1);

    assert!(tracker.start_session(ContentKey::course("c1")).await.is_err());
    assert!(!tracker.is_active());
    assert!(tracker.last_error().unwrap().contains("503"));
    assert!(!tracker.start_video_watching());
}

#[tokio::test]
async fn percentage_does_not_regress_locally() {
    let key = ContentKey::course("c1");
    let api = InMemoryProgressApi::new().with_progress(
        key.clone(),
        ProgressState {
            progress_percentage: 60.0,
            ..ProgressState::default()
        },
    );
    let (tracker, _clock) = tracker_on(&api);
    tracker.start_session(key.clone()).await.unwrap();

    tracker
        .update_progress(ProgressPatch::default().percentage(40.0))
        .await
        .unwrap();

    assert!(close(tracker.progress().unwrap().progress_percentage, 60.0));
    assert!(close(api.progress_of(&key).unwrap().progress_percentage, 40.0));
}

#[tokio::test]
async fn switching_content_flushes_previous_session() {
    let api = InMemoryProgressApi::new();
    let (tracker, clock) = tracker_on(&api);
    let first = ContentKey::tutorial("t1");
    let second = ContentKey::tutorial("t2");

    tracker.start_session(first.clone()).await.unwrap();
    let first_id = tracker.session_id().unwrap();
    tracker.start_video_watching();
    clock.advance(Duration::minutes(3));

    tracker.start_session(second.clone()).await.unwrap();

    assert_eq!(tracker.content_key(), Some(second.clone()));
    assert_ne!(tracker.session_id(), Some(first_id));
    assert!(close(api.progress_of(&first).unwrap().time_spent, 3.0));
    assert_eq!(
        api.requests(),
        vec![
            RecordedRequest::StartSession(first.clone()),
            RecordedRequest::Update(api.updates()[0].clone()),
            RecordedRequest::StartSession(second),
        ]
    );
}

#[tokio::test]
async fn complete_section_keeps_percentage() {
    let key = ContentKey::course("c1");
    let api = InMemoryProgressApi::new().with_progress(
        key.clone(),
        ProgressState {
            progress_percentage: 25.0,
            ..ProgressState::default()
        },
    );
    let (tracker, _clock) = tracker_on(&api);
    tracker.start_session(key).await.unwrap();

    let outcome = tracker.complete_section(SectionId::new("L2")).await.unwrap();
    let progress = outcome.applied().unwrap();
    assert_eq!(progress.completed_sections, vec![SectionId::new("L2")]);
    assert!(close(progress.progress_percentage, 25.0));
    assert_eq!(api.updates()[0].progress_percentage, Some(25.0));
}

#[tokio::test]
async fn applied_progress_is_cached_and_served_offline() {
    let api = InMemoryProgressApi::new();
    let cache = InMemoryRepository::new();
    let (tracker, _clock) = tracker_on(&api);
    let tracker = tracker.with_cache(Arc::new(cache.clone()));
    let key = ContentKey::tutorial("t1");

    tracker.start_session(key.clone()).await.unwrap();
    tracker.update_video_position(42.0).await.unwrap();

    let cached = cache.get_progress(&key).await.unwrap();
    assert!(close(cached.progress.last_position, 42.0));
    assert_eq!(cached.updated_at, fixed_now());

    api.fail_next(1);
    let loaded = tracker.load_progress(&key).await.unwrap();
    assert!(loaded.is_cached());
    assert!(close(loaded.progress().last_position, 42.0));

    let uncached = ContentKey::course("missing");
    api.fail_next(1);
    assert!(tracker.load_progress(&uncached).await.is_err());
}

#[tokio::test]
async fn start_answered_after_stop_is_superseded() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);
    let key = ContentKey::tutorial("t1");

    let gate = api.hold_next_start();
    let pending = tokio::spawn({
        let tracker = tracker.clone();
        let key = key.clone();
        async move { tracker.start_session(key).await }
    });
    while api.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(tracker.stop_session().await.unwrap().is_none());
    gate.release();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, TrackerError::Superseded(superseded) if superseded == key));
    assert!(!tracker.is_active());
    assert!(tracker.progress().is_none());
}

#[tokio::test]
async fn newer_start_wins_over_slow_older_start() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);
    let older = ContentKey::tutorial("t1");
    let newer = ContentKey::tutorial("t2");

    let gate = api.hold_next_start();
    let pending = tokio::spawn({
        let tracker = tracker.clone();
        let older = older.clone();
        async move { tracker.start_session(older).await }
    });
    while api.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    tracker.start_session(newer.clone()).await.unwrap();
    gate.release();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, TrackerError::Superseded(superseded) if superseded == older));
    assert!(tracker.is_active());
    assert_eq!(tracker.content_key(), Some(newer));
}

#[tokio::test]
async fn update_answered_after_stop_is_stale() {
    let api = InMemoryProgressApi::new();
    let (tracker, _clock) = tracker_on(&api);
    tracker.start_session(ContentKey::tutorial("t1")).await.unwrap();

    let gate = api.hold_next_update();
    let pending = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            tracker
                .update_progress(ProgressPatch::default().position(15.0))
                .await
        }
    });
    while api.updates().is_empty() {
        tokio::task::yield_now().await;
    }

    tracker.stop_session().await.unwrap();
    gate.release();

    assert_eq!(pending.await.unwrap().unwrap(), UpdateOutcome::Stale);
    assert!(!tracker.is_active());
    assert!(tracker.progress().is_none());
}
