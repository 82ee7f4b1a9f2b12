use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Limits applied to the fan-out of a single client request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FetchConfig {
    /// Timeout, in milliseconds, applied to each individual url fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum number of urls accepted in one client request.
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,
    /// Maximum number of urls fetched concurrently for one client request.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl FetchConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

    pub const DEFAULT_MAX_URLS: usize = 20;

    pub const DEFAULT_MAX_WORKERS: usize = 4;

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates fetch limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::zero("fetch.timeout_ms"));
        }

        if self.max_urls == 0 {
            return Err(ValidationError::zero("fetch.max_urls"));
        }

        if self.max_workers == 0 {
            return Err(ValidationError::zero("fetch.max_workers"));
        }

        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            max_urls: default_max_urls(),
            max_workers: default_max_workers(),
        }
    }
}

const fn default_fetch_timeout_ms() -> u64 {
    FetchConfig::DEFAULT_TIMEOUT_MS
}

const fn default_max_urls() -> usize {
    FetchConfig::DEFAULT_MAX_URLS
}

const fn default_max_workers() -> usize {
    FetchConfig::DEFAULT_MAX_WORKERS
}
