//! Application configuration.
//!
//! [`AppConfig`] carries everything [`init`](crate::Application::init) needs:
//! the feature set and the numeric knobs for each feature. It can be built in
//! code, with the `with_*` chain or [`AppConfig::builder`], or read from JSON:
//!
//! ```json
//! {
//!   "features": ["watchdog", "cloud_connectivity"],
//!   "scope_id": "0ne000ABCDE",
//!   "watchdog_period_secs": 30
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sphere_cloud::{
    ConnectivityConfig, DEFAULT_INITIAL_RETRY_SECS, DEFAULT_MAX_RETRY_SECS, RetryBackoff,
    validate_scope_id,
};
use sphere_errors::{ResourceError, SphereError, SphereResult};
use sphere_watchdog::DEFAULT_WATCHDOG_PERIOD_SECS;
use tracing::debug;

use crate::features::Features;

/// Default keepalive period in seconds, applied when `keepalive` is enabled.
pub const DEFAULT_KEEPALIVE_PERIOD_SECS: u32 = 240;
/// Default bound on a single connection attempt, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Settings for one application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Enabled features.
    pub features: Features,
    /// Watchdog period in seconds.
    pub watchdog_period_secs: u32,
    /// Device scope identity for cloud provisioning.
    pub scope_id: String,
    /// Keepalive period in seconds.
    pub keepalive_period_secs: u32,
    /// Ceiling for the connection retry delay, in seconds.
    pub max_retry_interval_secs: u32,
    /// First connection retry delay, in seconds.
    pub initial_retry_interval_secs: u32,
    /// Bound on a single connection attempt, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            features: Features::empty(),
            watchdog_period_secs: DEFAULT_WATCHDOG_PERIOD_SECS,
            scope_id: String::new(),
            keepalive_period_secs: DEFAULT_KEEPALIVE_PERIOD_SECS,
            max_retry_interval_secs: DEFAULT_MAX_RETRY_SECS,
            initial_retry_interval_secs: DEFAULT_INITIAL_RETRY_SECS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl AppConfig {
    /// Default settings with `features` enabled.
    #[must_use]
    pub fn new(features: Features) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    /// Start a validating builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Set the watchdog period.
    #[must_use]
    pub fn with_watchdog_period(mut self, secs: u32) -> Self {
        self.watchdog_period_secs = secs;
        self
    }

    /// Set the device scope identity.
    #[must_use]
    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = scope_id.into();
        self
    }

    /// Set the keepalive period.
    #[must_use]
    pub fn with_keepalive_period(mut self, secs: u32) -> Self {
        self.keepalive_period_secs = secs;
        self
    }

    /// Set the first retry delay and the retry ceiling.
    #[must_use]
    pub fn with_retry_intervals(mut self, initial_secs: u32, max_secs: u32) -> Self {
        self.initial_retry_interval_secs = initial_secs;
        self.max_retry_interval_secs = max_secs;
        self
    }

    /// Set the connection attempt timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Check the settings that the enabled features depend on.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for the first invalid value.
    pub fn validate(&self) -> SphereResult<()> {
        if self.features.contains(Features::WATCHDOG) && self.watchdog_period_secs == 0 {
            return Err(
                ResourceError::invalid_argument("watchdog period", "must be greater than 0")
                    .into(),
            );
        }
        if self.features.contains(Features::CLOUD_CONNECTIVITY) {
            validate_scope_id(&self.scope_id)?;
            if self.connect_timeout_ms == 0 {
                return Err(ResourceError::invalid_argument(
                    "connect timeout",
                    "must be greater than 0",
                )
                .into());
            }
        }
        if self.features.contains(Features::KEEPALIVE) && self.keepalive_period_secs == 0 {
            return Err(
                ResourceError::invalid_argument("keepalive period", "must be greater than 0")
                    .into(),
            );
        }
        RetryBackoff::new(self.initial_retry_interval_secs, self.max_retry_interval_secs)?;
        Ok(())
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SphereError::Config`] if the document does not parse, or the
    /// validation error.
    pub fn from_json_str(json: &str) -> SphereResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SphereError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SphereError::Config`] if the file cannot be read or parsed,
    /// or the validation error.
    pub fn load(path: impl AsRef<Path>) -> SphereResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SphereError::config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), features = %config.features, "configuration loaded");
        Ok(config)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SphereError::Config`] if serialization fails.
    pub fn to_json_string(&self) -> SphereResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SphereError::config(format!("cannot serialize configuration: {e}")))
    }

    /// Connectivity settings derived from this configuration.
    ///
    /// The keepalive period is only carried when `keepalive` is enabled.
    #[must_use]
    pub fn connectivity(&self) -> ConnectivityConfig {
        let config = ConnectivityConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..ConnectivityConfig::new(self.scope_id.clone())
        }
        .with_retry_bounds(
            self.initial_retry_interval_secs,
            self.max_retry_interval_secs,
        );
        if self.features.contains(Features::KEEPALIVE) {
            config.with_keepalive(self.keepalive_period_secs)
        } else {
            config
        }
    }
}

/// Validating builder for [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Enable `features` in addition to any already enabled.
    #[must_use]
    pub fn features(mut self, features: Features) -> Self {
        self.config.features |= features;
        self
    }

    /// Set the watchdog period.
    #[must_use]
    pub fn watchdog_period(mut self, secs: u32) -> Self {
        self.config.watchdog_period_secs = secs;
        self
    }

    /// Set the device scope identity.
    #[must_use]
    pub fn scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.config.scope_id = scope_id.into();
        self
    }

    /// Set the keepalive period.
    #[must_use]
    pub fn keepalive_period(mut self, secs: u32) -> Self {
        self.config.keepalive_period_secs = secs;
        self
    }

    /// Set the first retry delay and the retry ceiling.
    #[must_use]
    pub fn retry_intervals(mut self, initial_secs: u32, max_secs: u32) -> Self {
        self.config = self.config.with_retry_intervals(initial_secs, max_secs);
        self
    }

    /// Set the connection attempt timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_connect_timeout(timeout);
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn build(self) -> SphereResult<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.watchdog_period_secs, 60);
        assert_eq!(config.keepalive_period_secs, 240);
        assert_eq!(config.initial_retry_interval_secs, 10);
        assert_eq!(config.max_retry_interval_secs, 120);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_follows_features() {
        // Knobs of disabled features are not checked.
        assert!(AppConfig::new(Features::empty()).with_watchdog_period(0).validate().is_ok());
        assert!(AppConfig::new(Features::WATCHDOG).with_watchdog_period(0).validate().is_err());
        assert!(AppConfig::new(Features::CLOUD_CONNECTIVITY).validate().is_err());
        assert!(
            AppConfig::new(Features::CLOUD_CONNECTIVITY)
                .with_scope_id("abc123")
                .validate()
                .is_ok()
        );
        assert!(AppConfig::new(Features::KEEPALIVE).with_keepalive_period(0).validate().is_err());
    }

    #[test]
    fn test_connectivity_carries_keepalive_only_when_enabled() {
        let base = AppConfig::new(Features::CLOUD_CONNECTIVITY).with_scope_id("abc123");
        assert_eq!(base.connectivity().keepalive_secs, None);

        let with_keepalive = AppConfig::new(Features::CLOUD_CONNECTIVITY | Features::KEEPALIVE)
            .with_scope_id("abc123")
            .with_keepalive_period(30);
        assert_eq!(with_keepalive.connectivity().keepalive_secs, Some(30));
        assert_eq!(
            with_keepalive.connectivity().connect_timeout,
            Duration::from_millis(10_000)
        );
    }
}
