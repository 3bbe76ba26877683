//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (KIOSK_*)
//! 2. TOML config file (if KIOSK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod messaging;
mod validation;

pub use messaging::{LedStripConfig, MqttConfig, TopicConfig};
pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (KIOSK_*, nested keys separated by `__`)
/// 2. TOML config file (if KIOSK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding the cache partitions.
    ///
    /// Set via KIOSK_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the kiosk front-end that origin-form requests resolve against.
    ///
    /// Set via KIOSK_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Socket address the worker listens on.
    ///
    /// Set via KIOSK_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Version tag embedded in both partition names.
    ///
    /// Changing it discards every partition of the previous version on the
    /// next activation. Set via KIOSK_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Paths cached into the shell partition at install time, in order.
    ///
    /// Set via KIOSK_BOOTSTRAP_URLS environment variable (`[/, /offline.html]`).
    #[serde(default = "default_bootstrap_urls")]
    pub bootstrap_urls: Vec<String>,

    /// Document served for navigations when neither network nor runtime cache answer.
    ///
    /// Set via KIOSK_OFFLINE_FALLBACK environment variable.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    /// Regex matched against request hosts to detect Content API traffic.
    ///
    /// Set via KIOSK_CONTENT_HOST_PATTERN environment variable.
    #[serde(default = "default_content_host_pattern")]
    pub content_host_pattern: String,

    /// User-Agent string for upstream requests.
    ///
    /// Set via KIOSK_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes accepted per upstream response.
    ///
    /// Set via KIOSK_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via KIOSK_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Headless CMS connection settings.
    #[serde(default)]
    pub content: ContentConfig,

    /// LED hardware messaging settings.
    #[serde(default)]
    pub mqtt: MqttConfig,
}

/// Headless CMS (Content API) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// CMS project identifier. Set via KIOSK_CONTENT__PROJECT_ID.
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Dataset name. Set via KIOSK_CONTENT__DATASET.
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Dated API version (`YYYY-MM-DD`). Set via KIOSK_CONTENT__API_VERSION.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Query the CDN edge instead of the live API. Set via KIOSK_CONTENT__USE_CDN.
    #[serde(default)]
    pub use_cdn: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./kiosk-cache.sqlite")
}

fn default_origin() -> String {
    "http://127.0.0.1:4321".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_cache_version() -> String {
    "v1.0.0".into()
}

fn default_bootstrap_urls() -> Vec<String> {
    vec!["/".into(), "/offline.html".into(), "/favicon.svg".into(), "/manifest.json".into()]
}

fn default_offline_fallback() -> String {
    "/offline.html".into()
}

fn default_content_host_pattern() -> String {
    r"(^|\.)sanity\.io$".into()
}

fn default_user_agent() -> String {
    "museum-kiosk/0.1".into()
}

fn default_max_bytes() -> usize {
    20_971_520 // 20MB, exhibit videos are not routed through the cache
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_project_id() -> String {
    "832k5je1".into()
}

fn default_dataset() -> String {
    "production".into()
}

fn default_api_version() -> String {
    "2024-01-01".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            cache_version: default_cache_version(),
            bootstrap_urls: default_bootstrap_urls(),
            offline_fallback: default_offline_fallback(),
            content_host_pattern: default_content_host_pattern(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            content: ContentConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            dataset: default_dataset(),
            api_version: default_api_version(),
            use_cdn: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `KIOSK_`
    /// 2. TOML file from `KIOSK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("KIOSK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("KIOSK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
