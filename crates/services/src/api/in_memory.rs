use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use progress_core::model::{ContentKey, FULL_PERCENTAGE, ProgressState};
use tokio::sync::oneshot;

use super::{ProgressApi, ProgressUpdate};
use crate::error::ApiError;

/// A request as it reached the in-memory service.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    StartSession(ContentKey),
    Update(ProgressUpdate),
    Fetch(ContentKey),
}

/// In-process stand-in for the progress service, for tests and prototyping.
///
/// Updates are applied the way the backend applies them: watch minutes are
/// added to `timeSpent`, position and percentage are overwritten when
/// present, and a section id is appended once.
#[derive(Clone, Default)]
pub struct InMemoryProgressApi {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    progress: HashMap<ContentKey, ProgressState>,
    requests: Vec<RecordedRequest>,
    failures_left: usize,
    held_updates: VecDeque<oneshot::Receiver<()>>,
    held_starts: VecDeque<oneshot::Receiver<()>>,
}

/// Holds back one response until released or dropped.
#[derive(Debug)]
pub struct ResponseGate {
    release: oneshot::Sender<()>,
}

impl ResponseGate {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl InMemoryProgressApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed stored progress for `key`.
    #[must_use]
    pub fn with_progress(self, key: ContentKey, progress: ProgressState) -> Self {
        self.lock().progress.insert(key, progress);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` requests fail with `503 Service Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_left = count;
    }

    /// Delay the response of the next update until the gate is released.
    ///
    /// The update itself is applied on arrival, so the held response carries
    /// the state as it was at that moment.
    #[must_use]
    pub fn hold_next_update(&self) -> ResponseGate {
        let (release, held) = oneshot::channel();
        self.lock().held_updates.push_back(held);
        ResponseGate { release }
    }

    /// Delay the response of the next session start until the gate is released.
    #[must_use]
    pub fn hold_next_start(&self) -> ResponseGate {
        let (release, held) = oneshot::channel();
        self.lock().held_starts.push_back(held);
        ResponseGate { release }
    }

    #[must_use]
    pub fn progress_of(&self, key: &ContentKey) -> Option<ProgressState> {
        self.lock().progress.get(key).cloned()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.lock()
            .requests
            .iter()
            .filter_map(|request| match request {
                RecordedRequest::Update(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: RecordedRequest) -> Result<MutexGuard<'_, Inner>, ApiError> {
        let mut inner = self.lock();
        inner.requests.push(request);
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(ApiError::HttpStatus(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(inner)
    }
}

fn apply_update(progress: &mut ProgressState, update: &ProgressUpdate) {
    if let Some(minutes) = update.time_spent_minutes {
        progress.time_spent += minutes.max(0.0);
    }
    if let Some(position) = update.last_position {
        progress.last_position = position.max(0.0);
    }
    if let Some(percentage) = update.progress_percentage {
        progress.progress_percentage = percentage.clamp(0.0, FULL_PERCENTAGE);
    }
    if let Some(section) = &update.section_id {
        if !progress.completed_sections.contains(section) {
            progress.completed_sections.push(section.clone());
        }
    }
    if progress.progress_percentage >= FULL_PERCENTAGE {
        progress.is_completed = true;
    }
}

#[async_trait]
impl ProgressApi for InMemoryProgressApi {
    async fn start_session(&self, key: &ContentKey) -> Result<ProgressState, ApiError> {
        let (snapshot, held) = {
            let mut inner = self.record(RecordedRequest::StartSession(key.clone()))?;
            let snapshot = inner.progress.entry(key.clone()).or_default().clone();
            (snapshot, inner.held_starts.pop_front())
        };

        if let Some(held) = held {
            let _ = held.await;
        }
        Ok(snapshot)
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<ProgressState, ApiError> {
        let (snapshot, held) = {
            let mut inner = self.record(RecordedRequest::Update(update.clone()))?;
            let progress = inner.progress.entry(update.key.clone()).or_default();
            apply_update(progress, update);
            let snapshot = progress.clone();
            (snapshot, inner.held_updates.pop_front())
        };

        if let Some(held) = held {
            let _ = held.await;
        }
        Ok(snapshot)
    }

    async fn fetch_progress(&self, key: &ContentKey) -> Result<ProgressState, ApiError> {
        let inner = self.record(RecordedRequest::Fetch(key.clone()))?;
        Ok(inner.progress.get(key).cloned().unwrap_or_default())
    }
}
