use std::fmt;
use std::time::Duration;

use config::shared::{FetchConfig, PayloadEncoding, ValidationError};
use serde::Deserialize;

/// Complete configuration for the fetch service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Limits on concurrently served client requests.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Limits applied to the urls of each client request.
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl ApiConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.application.validate()?;
        self.admission.validate()?;
        self.fetch.validate()
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
    /// Path of the fetch route.
    #[serde(default = "default_route")]
    pub route: String,
    /// Number of HTTP worker threads, defaults to the number of physical cores.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Maximum accepted size of a request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// How fetched payloads are rendered in responses.
    #[serde(default)]
    pub payload_encoding: PayloadEncoding,
}

impl ApplicationSettings {
    pub const DEFAULT_ROUTE: &'static str = "/post";

    pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

    fn validate(&self) -> Result<(), ValidationError> {
        if !self.route.starts_with('/') {
            return Err(ValidationError::InvalidFieldValue {
                field: "application.route".to_string(),
                constraint: "must start with `/`".to_string(),
            });
        }

        if self.workers == Some(0) {
            return Err(ValidationError::zero("application.workers"));
        }

        if self.max_body_bytes == 0 {
            return Err(ValidationError::zero("application.max_body_bytes"));
        }

        Ok(())
    }
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)?;
        writeln!(f, "    route: {}", self.route)
    }
}

fn default_route() -> String {
    ApplicationSettings::DEFAULT_ROUTE.to_string()
}

const fn default_max_body_bytes() -> usize {
    ApplicationSettings::DEFAULT_MAX_BODY_BYTES
}

/// Admission control and shutdown settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Maximum number of client requests served at once. Further requests wait for a slot.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Time given to in-flight requests to complete once shutdown begins.
    #[serde(default = "default_drain_deadline_secs")]
    pub drain_deadline_secs: u64,
}

impl AdmissionConfig {
    pub const DEFAULT_MAX_CLIENTS: usize = 100;

    pub const DEFAULT_DRAIN_DEADLINE_SECS: u64 = 5;

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_secs(self.drain_deadline_secs)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_clients == 0 {
            return Err(ValidationError::zero("admission.max_clients"));
        }

        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
            drain_deadline_secs: default_drain_deadline_secs(),
        }
    }
}

const fn default_max_clients() -> usize {
    AdmissionConfig::DEFAULT_MAX_CLIENTS
}

const fn default_drain_deadline_secs() -> u64 {
    AdmissionConfig::DEFAULT_DRAIN_DEADLINE_SECS
}
