use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use progress_core::Clock;
use progress_core::model::{ContentKey, FULL_PERCENTAGE, ProgressState, SectionId, TrackingSessionId};
use progress_core::resume::ResumeGuard;
use progress_core::time::duration_to_minutes;
use storage::repository::{CachedProgress, ProgressCacheRepository, StorageError};
use tracing::{debug, info, warn};

use super::state::{ActiveSession, PendingUpdate, TrackerState};
use crate::api::{ProgressApi, ProgressPatch, ProgressUpdate};
use crate::config::TrackerConfig;
use crate::error::{ApiError, TrackerError};

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Why a progress update was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No tracking session is active.
    Inactive,
    /// The position report falls inside the resume-seek guard window.
    ResumeSeek,
    /// The position is not a finite number.
    InvalidPosition,
    /// The lesson is already recorded as completed.
    AlreadyCompleted,
}

/// Result of a progress update that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The server response was applied and is now the local state.
    Applied(ProgressState),
    /// The server answered, but a newer response had already been applied or
    /// the session ended meanwhile; the answer was dropped.
    Stale,
    /// Nothing was sent.
    Skipped(SkipReason),
}

impl UpdateOutcome {
    #[must_use]
    pub fn applied(&self) -> Option<&ProgressState> {
        match self {
            UpdateOutcome::Applied(progress) => Some(progress),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, UpdateOutcome::Skipped(_))
    }
}

/// Progress loaded outside a session, live or from the local cache.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedProgress {
    Live(ProgressState),
    Cached(CachedProgress),
}

impl LoadedProgress {
    #[must_use]
    pub fn progress(&self) -> &ProgressState {
        match self {
            LoadedProgress::Live(progress) => progress,
            LoadedProgress::Cached(cached) => &cached.progress,
        }
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self, LoadedProgress::Cached(_))
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Session controller and sync client for one viewer.
///
/// Cloning yields another handle to the same session. All state sits behind a
/// single lock that is never held across a network call, so several updates
/// may be in flight at once; each carries a sequence number and only the
/// highest-numbered response is applied.
#[derive(Clone)]
pub struct ProgressTracker {
    api: Arc<dyn ProgressApi>,
    cache: Option<Arc<dyn ProgressCacheRepository>>,
    clock: Clock,
    resume_guard: Duration,
    state: Arc<Mutex<TrackerState>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(api: Arc<dyn ProgressApi>) -> Self {
        Self {
            api,
            cache: None,
            clock: Clock::default_clock(),
            resume_guard: ResumeGuard::default().window(),
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mirror every applied progress into `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ProgressCacheRepository>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_resume_guard(mut self, window: Duration) -> Self {
        self.resume_guard = window;
        self
    }

    /// Apply the tunables of `config`.
    #[must_use]
    pub fn with_config(self, config: &TrackerConfig) -> Self {
        self.with_resume_guard(config.resume_guard_delta())
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Inspection ────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    #[must_use]
    pub fn content_key(&self) -> Option<ContentKey> {
        self.lock().active.as_ref().map(|active| active.key.clone())
    }

    #[must_use]
    pub fn session_id(&self) -> Option<TrackingSessionId> {
        self.lock().active.as_ref().map(|active| active.id)
    }

    /// Snapshot of the local progress of the active session.
    #[must_use]
    pub fn progress(&self) -> Option<ProgressState> {
        self.lock().active.as_ref().map(|active| active.progress.clone())
    }

    /// Message of the most recent failure, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.lock()
            .active
            .as_ref()
            .is_some_and(|active| active.timer.is_running())
    }

    /// Watched minutes from closed intervals not yet sent to the server.
    #[must_use]
    pub fn unsynced_watch_minutes(&self) -> f64 {
        self.lock()
            .active
            .as_ref()
            .map_or(0.0, |active| active.timer.accumulated_minutes())
    }

    // ─── Watch timer ───────────────────────────────────────────────────────

    /// Start a playing interval. Returns `false` when no session is active or
    /// an interval is already running.
    pub fn start_video_watching(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        match state.active.as_mut() {
            Some(active) => active.timer.start(now),
            None => false,
        }
    }

    /// Close the running interval. Returns the closed interval in minutes, or
    /// `None` when nothing was running.
    pub fn stop_video_watching(&self) -> Option<f64> {
        let now = self.clock.now();
        let mut state = self.lock();
        let active = state.active.as_mut()?;
        active.timer.stop(now).map(duration_to_minutes)
    }

    // ─── Session lifecycle ─────────────────────────────────────────────────

    /// Open a session for `key` and adopt the server's progress.
    ///
    /// A session that is already active is stopped first. On failure the
    /// tracker stays idle and `last_error` is set.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Api` if the server call fails, or
    /// `TrackerError::Superseded` if another start or stop happened while
    /// waiting for the response.
    pub async fn start_session(&self, key: ContentKey) -> Result<ProgressState, TrackerError> {
        if self.is_active() {
            if let Err(err) = self.stop_session().await {
                warn!(error = %err, "final flush of previous session failed");
            }
        }

        let epoch = self.lock().bump_epoch();
        info!(content = %key, "starting progress session");

        let progress = match self.api.start_session(&key).await {
            Ok(progress) => progress.normalized(),
            Err(err) => {
                warn!(content = %key, error = %err, "progress session failed to start");
                self.lock().last_error = Some(err.to_string());
                return Err(err.into());
            }
        };

        {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!(content = %key, "discarding superseded session start");
                return Err(TrackerError::Superseded(key));
            }
            let active = ActiveSession::new(
                key.clone(),
                epoch,
                progress.clone(),
                ResumeGuard::new(self.resume_guard),
            );
            info!(session = %active.id, content = %key, "progress session active");
            state.active = Some(active);
            state.last_error = None;
        }

        self.write_cache(&key, &progress).await;
        Ok(progress)
    }

    /// Close the active session, flushing unsent watch time once.
    ///
    /// Returns the server's progress after the flush, or `None` when the
    /// tracker was idle or there was nothing to flush.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Api` if the final flush fails. The session is
    /// closed either way.
    pub async fn stop_session(&self) -> Result<Option<ProgressState>, TrackerError> {
        let now = self.clock.now();
        let flush = {
            let mut state = self.lock();
            state.bump_epoch();
            let Some(mut active) = state.active.take() else {
                return Ok(None);
            };
            active.timer.stop(now);
            let watched = active.timer.take_unsynced(now);
            info!(
                session = %active.id,
                content = %active.key,
                unsynced_minutes = duration_to_minutes(watched),
                "stopping progress session"
            );
            (watched > Duration::zero())
                .then(|| ProgressUpdate::new(active.key.clone()).with_watch_time(watched))
        };

        let Some(request) = flush else {
            return Ok(None);
        };

        match self.api.update_progress(&request).await {
            Ok(progress) => {
                let progress = progress.normalized();
                self.write_cache(&request.key, &progress).await;
                Ok(Some(progress))
            }
            Err(err) => {
                warn!(content = %request.key, error = %err, "final progress flush failed");
                self.lock().last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    // ─── Sync ──────────────────────────────────────────────────────────────

    /// Send unsynced watch time plus `patch` and adopt the server's answer.
    ///
    /// Does nothing when no session is active.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Api` if the request fails; the unsent watch time
    /// is kept for the next update and `last_error` is set. Nothing is retried
    /// automatically. A request the server applied but whose response was
    /// lost (a timeout, say) has its minutes sent again by the next update.
    pub async fn update_progress(&self, patch: ProgressPatch) -> Result<UpdateOutcome, TrackerError> {
        let now = self.clock.now();
        let pending = {
            let mut state = self.lock();
            let TrackerState {
                active, next_seq, ..
            } = &mut *state;
            let Some(active) = active.as_mut() else {
                return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
            };
            *next_seq += 1;
            let watched = active.timer.take_unsynced(now);
            PendingUpdate {
                seq: *next_seq,
                epoch: active.epoch,
                session_id: active.id,
                watched,
                request: ProgressUpdate::new(active.key.clone())
                    .with_watch_time(watched)
                    .with_patch(patch),
            }
        };

        debug!(
            session = %pending.session_id,
            seq = pending.seq,
            minutes = ?pending.request.time_spent_minutes,
            "sending progress update"
        );
        let result = self.api.update_progress(&pending.request).await;
        self.finish_update(pending, result).await
    }

    async fn finish_update(
        &self,
        pending: PendingUpdate,
        result: Result<ProgressState, ApiError>,
    ) -> Result<UpdateOutcome, TrackerError> {
        let server = match result {
            Ok(server) => server,
            Err(err) => {
                let mut state = self.lock();
                // Credited time may already be counted server-side if only the
                // response was lost.
                if let Some(active) = state.active_in(pending.epoch) {
                    active.timer.credit(pending.watched);
                }
                warn!(
                    session = %pending.session_id,
                    seq = pending.seq,
                    error = %err,
                    "progress update failed"
                );
                state.last_error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let applied = {
            let mut state = self.lock();
            state.last_error = None;
            match state.active_in(pending.epoch) {
                Some(active) if active.applied_seq < pending.seq => {
                    active.apply(pending.seq, server);
                    Some(active.progress.clone())
                }
                _ => None,
            }
        };

        match applied {
            Some(progress) => {
                self.write_cache(&pending.request.key, &progress).await;
                Ok(UpdateOutcome::Applied(progress))
            }
            None => {
                debug!(
                    session = %pending.session_id,
                    seq = pending.seq,
                    "discarding stale progress response"
                );
                Ok(UpdateOutcome::Stale)
            }
        }
    }

    /// Report the playback position, rounded to whole seconds.
    ///
    /// Reports inside the resume-seek guard window are dropped.
    ///
    /// # Errors
    ///
    /// See [`ProgressTracker::update_progress`].
    pub async fn update_video_position(&self, position: f64) -> Result<UpdateOutcome, TrackerError> {
        if !position.is_finite() {
            return Ok(UpdateOutcome::Skipped(SkipReason::InvalidPosition));
        }
        let now = self.clock.now();
        {
            let mut state = self.lock();
            let Some(active) = state.active.as_mut() else {
                return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
            };
            if active.guard.suppresses(now) {
                debug!(session = %active.id, position, "ignoring resume-seek position");
                return Ok(UpdateOutcome::Skipped(SkipReason::ResumeSeek));
            }
        }
        self.update_progress(ProgressPatch::default().position(position.max(0.0).round()))
            .await
    }

    /// Mark a section done, keeping the current percentage.
    ///
    /// # Errors
    ///
    /// See [`ProgressTracker::update_progress`].
    pub async fn complete_section(&self, section: SectionId) -> Result<UpdateOutcome, TrackerError> {
        let Some(current) = self.progress().map(|progress| progress.progress_percentage) else {
            return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
        };
        self.update_progress(ProgressPatch::default().section(section).percentage(current))
            .await
    }

    /// Mark the whole content item done.
    ///
    /// The watch timer is stopped first so the trailing interval is included.
    ///
    /// # Errors
    ///
    /// See [`ProgressTracker::update_progress`].
    pub async fn complete_content(&self) -> Result<UpdateOutcome, TrackerError> {
        if !self.is_active() {
            return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
        }
        self.stop_video_watching();
        self.update_progress(ProgressPatch::default().percentage(FULL_PERCENTAGE))
            .await
    }

    /// Position the host should seek to when playback opens.
    ///
    /// Arms the resume-seek guard, so the seek it triggers is not reported
    /// back as progress. Returns `None` without arming when there is nothing
    /// to resume.
    pub fn begin_resume_seek(&self) -> Option<f64> {
        let now = self.clock.now();
        let mut state = self.lock();
        let active = state.active.as_mut()?;
        let target = active.progress.resume_position()?;
        active.guard.arm(now);
        debug!(session = %active.id, target, "resume-seek guard armed");
        Some(target)
    }

    // ─── Outside a session ─────────────────────────────────────────────────

    /// Fetch progress for any content item without opening a session.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Api` if the request fails.
    pub async fn fetch_progress(&self, key: &ContentKey) -> Result<ProgressState, TrackerError> {
        let progress = self.api.fetch_progress(key).await?.normalized();
        self.write_cache(key, &progress).await;
        Ok(progress)
    }

    /// Fetch progress, falling back to the local cache when the request fails.
    ///
    /// # Errors
    ///
    /// Returns the request error when nothing is cached for `key`.
    pub async fn load_progress(&self, key: &ContentKey) -> Result<LoadedProgress, TrackerError> {
        match self.fetch_progress(key).await {
            Ok(progress) => Ok(LoadedProgress::Live(progress)),
            Err(err) => {
                let Some(cache) = &self.cache else {
                    return Err(err);
                };
                match cache.get_progress(key).await {
                    Ok(cached) => {
                        warn!(content = %key, error = %err, "serving cached progress");
                        Ok(LoadedProgress::Cached(cached))
                    }
                    Err(StorageError::NotFound) => Err(err),
                    Err(cache_err) => {
                        warn!(content = %key, error = %cache_err, "progress cache read failed");
                        Err(err)
                    }
                }
            }
        }
    }

    async fn write_cache(&self, key: &ContentKey, progress: &ProgressState) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.upsert_progress(key, progress, self.clock.now()).await {
            warn!(content = %key, error = %err, "failed to cache progress");
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ProgressTracker")
            .field("active", &state.active.as_ref().map(|active| &active.key))
            .field("epoch", &state.epoch)
            .field("next_seq", &state.next_seq)
            .field("last_error", &state.last_error)
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
