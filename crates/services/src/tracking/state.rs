use chrono::Duration;
use progress_core::model::{ContentKey, FULL_PERCENTAGE, ProgressState, TrackingSessionId};
use progress_core::resume::ResumeGuard;
use progress_core::watch_timer::WatchTimer;

use crate::api::ProgressUpdate;

/// Everything the tracker owns, behind one lock.
///
/// `epoch` moves on every session start and stop, so responses issued for an
/// earlier session can be recognised and dropped.
#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub(crate) active: Option<ActiveSession>,
    pub(crate) epoch: u64,
    pub(crate) next_seq: u64,
    pub(crate) last_error: Option<String>,
}

impl TrackerState {
    pub(crate) fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn active_in(&mut self, epoch: u64) -> Option<&mut ActiveSession> {
        self.active.as_mut().filter(|active| active.epoch == epoch)
    }
}

#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub(crate) id: TrackingSessionId,
    pub(crate) key: ContentKey,
    pub(crate) epoch: u64,
    pub(crate) progress: ProgressState,
    pub(crate) timer: WatchTimer,
    pub(crate) guard: ResumeGuard,
    pub(crate) applied_seq: u64,
}

impl ActiveSession {
    pub(crate) fn new(key: ContentKey, epoch: u64, progress: ProgressState, guard: ResumeGuard) -> Self {
        Self {
            id: TrackingSessionId::generate(),
            key,
            epoch,
            progress,
            timer: WatchTimer::new(),
            guard,
            applied_seq: 0,
        }
    }

    /// Replace local progress with a server response numbered `seq`.
    ///
    /// Returns `false` when a response with a higher number was already
    /// applied. The percentage never drops below the local value.
    pub(crate) fn apply(&mut self, seq: u64, server: ProgressState) -> bool {
        if seq <= self.applied_seq {
            return false;
        }
        let mut next = server.normalized();
        if next.progress_percentage < self.progress.progress_percentage {
            next.progress_percentage = self.progress.progress_percentage;
        }
        if next.progress_percentage >= FULL_PERCENTAGE {
            next.is_completed = true;
        }
        self.progress = next;
        self.applied_seq = seq;
        true
    }
}

/// An update that has left the lock and is waiting for the network.
#[derive(Debug)]
pub(crate) struct PendingUpdate {
    pub(crate) seq: u64,
    pub(crate) epoch: u64,
    pub(crate) session_id: TrackingSessionId,
    pub(crate) watched: Duration,
    pub(crate) request: ProgressUpdate,
}
