//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_version` is empty or contains whitespace
    /// - `origin` is not an http(s) origin
    /// - a bootstrap path is not absolute, or the offline fallback is not part of the bootstrap set
    /// - `max_bytes` is 0 or `timeout_ms` is outside 100ms..=5min
    /// - two LED strips share a strip number
    ///
    /// Returns `ConfigError::Missing` if messaging is enabled without a broker URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version.is_empty() || self.cache_version.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "cache_version".into(),
                reason: "must be a non-empty tag without whitespace".into(),
            });
        }

        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) origin".into() });
        }

        if self.bootstrap_urls.is_empty() {
            return Err(ConfigError::Invalid { field: "bootstrap_urls".into(), reason: "must not be empty".into() });
        }
        if let Some(bad) = self.bootstrap_urls.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "bootstrap_urls".into(),
                reason: format!("path {bad:?} must start with '/'"),
            });
        }
        if !self.bootstrap_urls.contains(&self.offline_fallback) {
            return Err(ConfigError::Invalid {
                field: "offline_fallback".into(),
                reason: format!("{} is not part of bootstrap_urls", self.offline_fallback),
            });
        }

        if self.content_host_pattern.is_empty() {
            return Err(ConfigError::Invalid {
                field: "content_host_pattern".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.mqtt.enabled && self.mqtt.broker_url.is_none() {
            return Err(ConfigError::Missing {
                field: "mqtt.broker_url".into(),
                hint: "Set KIOSK_MQTT__BROKER_URL or disable messaging".into(),
            });
        }

        let mut seen = HashSet::new();
        for strip in &self.mqtt.led_strips {
            if !seen.insert(strip.strip_number) {
                return Err(ConfigError::Invalid {
                    field: "mqtt.led_strips".into(),
                    reason: format!("strip {} configured twice", strip.strip_number),
                });
            }
        }

        if self.mqtt.enabled && self.mqtt.topics.status_topic.is_none() {
            tracing::warn!("messaging enabled without status_topic; connection status will not be published");
        }

        Ok(())
    }
}
