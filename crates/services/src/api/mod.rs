//! Client side of the progress REST contract.

mod http;
mod in_memory;

use async_trait::async_trait;
use chrono::Duration;
use progress_core::model::{ContentKey, ProgressState, SectionId};
use progress_core::time::duration_to_minutes;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub use http::HttpProgressApi;
pub use in_memory::{InMemoryProgressApi, RecordedRequest, ResponseGate};

/// The three progress endpoints the tracker relies on.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    /// `POST /progress/start-session`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the service rejects it.
    async fn start_session(&self, key: &ContentKey) -> Result<ProgressState, ApiError>;

    /// `POST /progress/update`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the service rejects it.
    async fn update_progress(&self, update: &ProgressUpdate) -> Result<ProgressState, ApiError>;

    /// `GET /progress/content/:contentType/:contentId`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the service rejects it.
    async fn fetch_progress(&self, key: &ContentKey) -> Result<ProgressState, ApiError>;
}

/// Body of `POST /progress/update`.
///
/// `time_spent_minutes` is the watch time accrued since the previous update,
/// never a running total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(flatten)]
    pub key: ContentKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(key: ContentKey) -> Self {
        Self {
            key,
            time_spent_minutes: None,
            last_position: None,
            progress_percentage: None,
            section_id: None,
        }
    }

    /// Attach watch time; zero spans are left out of the request.
    #[must_use]
    pub fn with_watch_time(mut self, watched: Duration) -> Self {
        self.time_spent_minutes = (watched > Duration::zero()).then(|| duration_to_minutes(watched));
        self
    }

    /// Overlay caller-supplied fields.
    #[must_use]
    pub fn with_patch(mut self, patch: ProgressPatch) -> Self {
        self.last_position = patch.last_position.or(self.last_position);
        self.progress_percentage = patch.progress_percentage.or(self.progress_percentage);
        self.section_id = patch.section_id.or(self.section_id);
        self
    }
}

/// Optional fields a caller adds to a progress update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    pub last_position: Option<f64>,
    pub progress_percentage: Option<f64>,
    pub section_id: Option<SectionId>,
}

impl ProgressPatch {
    #[must_use]
    pub fn position(mut self, seconds: f64) -> Self {
        self.last_position = Some(seconds);
        self
    }

    #[must_use]
    pub fn percentage(mut self, percentage: f64) -> Self {
        self.progress_percentage = Some(percentage);
        self
    }

    #[must_use]
    pub fn section(mut self, section: SectionId) -> Self {
        self.section_id = Some(section);
        self
    }
}

/// `{success, data: {progress}, message?}` envelope shared by all endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<EnvelopeData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    progress: Option<ProgressState>,
}

impl Envelope {
    pub(crate) fn into_progress(self) -> Result<ProgressState, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "unspecified error".to_string()),
            ));
        }
        self.data
            .and_then(|data| data.progress)
            .map(ProgressState::normalized)
            .ok_or(ApiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_body_omits_unset_fields() {
        let update = ProgressUpdate::new(ContentKey::tutorial("t1"))
            .with_watch_time(Duration::zero())
            .with_patch(ProgressPatch::default().position(42.0));
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(
            body,
            json!({"contentType": "tutorial", "contentId": "t1", "lastPosition": 42.0})
        );
    }

    #[test]
    fn update_body_carries_watch_minutes_and_section() {
        let update = ProgressUpdate::new(ContentKey::course("c1"))
            .with_watch_time(Duration::seconds(90))
            .with_patch(
                ProgressPatch::default()
                    .section(SectionId::new("l2"))
                    .percentage(40.0),
            );
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body["timeSpentMinutes"], json!(1.5));
        assert_eq!(body["sectionId"], json!("l2"));
        assert_eq!(body["progressPercentage"], json!(40.0));
    }

    #[test]
    fn envelope_failure_surfaces_message() {
        let envelope: Envelope =
            serde_json::from_value(json!({"success": false, "message": "Not authorized"})).unwrap();
        assert!(matches!(
            envelope.into_progress(),
            Err(ApiError::Rejected(msg)) if msg == "Not authorized"
        ));
    }

    #[test]
    fn envelope_without_progress_is_empty() {
        let envelope: Envelope =
            serde_json::from_value(json!({"success": true, "data": {}})).unwrap();
        assert!(matches!(envelope.into_progress(), Err(ApiError::EmptyResponse)));
    }

    #[test]
    fn envelope_progress_is_normalized() {
        let envelope: Envelope = serde_json::from_value(json!({
            "success": true,
            "data": {"progress": {"progressPercentage": 250, "lastPosition": 12}}
        }))
        .unwrap();
        let progress = envelope.into_progress().unwrap();
        assert!((progress.progress_percentage - 100.0).abs() < f64::EPSILON);
        assert!(progress.is_completed);
    }
}
