use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{ContentKey, ProgressState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Last progress applied for a content item, as kept on the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedProgress {
    pub key: ContentKey,
    pub progress: ProgressState,
    pub updated_at: DateTime<Utc>,
}

/// Local client storage for the bearer token sent with progress requests.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Fetch the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_token(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be stored.
    async fn save_token(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the stored token. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn clear_token(&self) -> Result<(), StorageError>;
}

/// Cache of the last server-confirmed progress per content item.
#[async_trait]
pub trait ProgressCacheRepository: Send + Sync {
    /// Persist or replace the cached progress for `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn upsert_progress(
        &self,
        key: &ContentKey,
        progress: &ProgressState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Fetch the cached progress for `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is cached, or other storage errors.
    async fn get_progress(&self, key: &ContentKey) -> Result<CachedProgress, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    token: Arc<Mutex<Option<String>>>,
    progress: Arc<Mutex<HashMap<ContentKey, CachedProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Arc::new(Mutex::new(None)),
            progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a repository that already holds `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let repo = Self::new();
        if let Ok(mut guard) = repo.token.lock() {
            *guard = Some(token.into());
        }
        repo
    }
}

#[async_trait]
impl TokenRepository for InMemoryRepository {
    async fn get_token(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(token.to_owned());
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[async_trait]
impl ProgressCacheRepository for InMemoryRepository {
    async fn upsert_progress(
        &self,
        key: &ContentKey,
        progress: &ProgressState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            key.clone(),
            CachedProgress {
                key: key.clone(),
                progress: progress.clone(),
                updated_at,
            },
        );
        Ok(())
    }

    async fn get_progress(&self, key: &ContentKey) -> Result<CachedProgress, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(key).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates client repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tokens: Arc<dyn TokenRepository>,
    pub progress: Arc<dyn ProgressCacheRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let tokens: Arc<dyn TokenRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressCacheRepository> = Arc::new(repo);
        Self { tokens, progress }
    }
}
