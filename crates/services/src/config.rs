use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RESUME_GUARD_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const BASE_URL_VAR: &str = "PROGRESS_API_BASE_URL";
const SYNC_INTERVAL_VAR: &str = "PROGRESS_SYNC_INTERVAL_SECS";
const RESUME_GUARD_VAR: &str = "PROGRESS_RESUME_GUARD_MS";
const REQUEST_TIMEOUT_VAR: &str = "PROGRESS_REQUEST_TIMEOUT_SECS";

/// Settings for talking to the progress endpoints and pacing position reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Prefix that `progress/...` endpoint paths are appended to.
    pub base_url: Url,
    /// Playback advancement between periodic position reports.
    pub sync_interval: Duration,
    /// How long position reports are ignored after the resume-seek.
    pub resume_guard: Duration,
    pub request_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url should be valid"),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            resume_guard: Duration::from_millis(DEFAULT_RESUME_GUARD_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl TrackerConfig {
    /// Read the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults for
    /// unset or blank variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = read(BASE_URL_VAR) {
            config.base_url = parse_base_url(raw.trim())?;
        }
        if let Some(raw) = read(SYNC_INTERVAL_VAR) {
            config.sync_interval = Duration::from_secs(parse_positive(SYNC_INTERVAL_VAR, &raw)?);
        }
        if let Some(raw) = read(RESUME_GUARD_VAR) {
            config.resume_guard = Duration::from_millis(parse_positive(RESUME_GUARD_VAR, &raw)?);
        }
        if let Some(raw) = read(REQUEST_TIMEOUT_VAR) {
            config.request_timeout =
                Duration::from_secs(parse_positive(REQUEST_TIMEOUT_VAR, &raw)?);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Resume guard as a calendar duration, for use with `Clock` timestamps.
    #[must_use]
    pub fn resume_guard_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.resume_guard)
            .unwrap_or_else(|_| chrono::Duration::milliseconds(progress_core::resume::DEFAULT_RESUME_GUARD_MS))
    }
}

/// Parse and check a base URL that endpoint segments can be appended to.
///
/// # Errors
///
/// Returns `ConfigError` if the URL is malformed or cannot hold a path.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::CannotBeABase(raw.to_string()));
    }
    Ok(url)
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
        }),
    }
}
