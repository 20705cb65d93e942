use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{ContentKey, ProgressState};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use storage::repository::TokenRepository;
use tracing::debug;
use url::Url;

use super::{Envelope, ProgressApi, ProgressUpdate};
use crate::config::TrackerConfig;
use crate::error::ApiError;

/// `reqwest` implementation of the progress endpoints.
///
/// The bearer token is read from local client storage on every request; when
/// none is stored the request goes out without an `Authorization` header.
#[derive(Clone)]
pub struct HttpProgressApi {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenRepository>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest<'a> {
    #[serde(flatten)]
    key: &'a ContentKey,
}

impl HttpProgressApi {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be constructed, or
    /// `ApiError::InvalidBaseUrl` if the base URL cannot carry a path.
    pub fn new(config: &TrackerConfig, tokens: Arc<dyn TokenRepository>) -> Result<Self, ApiError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.base_url.to_string()));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            tokens,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        match self.tokens.get_token().await? {
            Some(token) if !token.trim().is_empty() => Ok(request.bearer_auth(token)),
            _ => Ok(request),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<ProgressState, ApiError> {
        let response = self.authorized(request).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies may still carry the `{success: false, message}` envelope.
            return match response.json::<Envelope>().await {
                Ok(Envelope {
                    message: Some(message),
                    ..
                }) => Err(ApiError::Rejected(format!("{message} ({status})"))),
                _ => Err(ApiError::HttpStatus(status)),
            };
        }

        let envelope: Envelope = response.json().await?;
        envelope.into_progress()
    }
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn start_session(&self, key: &ContentKey) -> Result<ProgressState, ApiError> {
        let url = self.endpoint(&["progress", "start-session"])?;
        debug!(%url, content = %key, "starting progress session");
        self.send(self.client.post(url).json(&StartSessionRequest { key }))
            .await
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<ProgressState, ApiError> {
        let url = self.endpoint(&["progress", "update"])?;
        debug!(%url, content = %update.key, "sending progress update");
        self.send(self.client.post(url).json(update)).await
    }

    async fn fetch_progress(&self, key: &ContentKey) -> Result<ProgressState, ApiError> {
        let url = self.endpoint(&[
            "progress",
            "content",
            key.content_type.as_str(),
            key.content_id.as_str(),
        ])?;
        debug!(%url, "fetching progress");
        self.send(self.client.get(url)).await
    }
}
