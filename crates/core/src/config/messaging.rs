//! MQTT settings for the LED hardware bridge.

use serde::{Deserialize, Serialize};

/// MQTT connection and topic settings.
///
/// Messaging is optional: with `enabled = false` the worker never opens a
/// broker connection and every publish reports `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Whether the messaging client is started at all. Set via KIOSK_MQTT__ENABLED.
    #[serde(default)]
    pub enabled: bool,

    /// Broker URL (`mqtt://host:1883`, `tcp://…` or `mqtts://…`).
    #[serde(default)]
    pub broker_url: Option<String>,

    /// MQTT client id, also reported as the kiosk id in status messages.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Human readable kiosk name reported in status and interaction messages.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Delay between reconnect attempts in milliseconds.
    #[serde(default = "default_reconnect_period_ms")]
    pub reconnect_period_ms: u64,

    /// Reconnect attempts before the session is given up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default)]
    pub topics: TopicConfig,

    /// LED strips wired to the kiosk, keyed by strip number.
    #[serde(default)]
    pub led_strips: Vec<LedStripConfig>,
}

/// Topics used by the kiosk helpers. Unset topics disable the matching helper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Prefix for per-strip exhibit highlight commands (`<base>/strip<N>`).
    #[serde(default)]
    pub lightbulb_topic_base: Option<String>,

    /// Topic for generic LED commands (effects, colour, off).
    #[serde(default)]
    pub lightbulb_topic: Option<String>,

    #[serde(default)]
    pub interaction_topic: Option<String>,

    #[serde(default)]
    pub status_topic: Option<String>,
}

/// One physical LED strip and the ESP32 controller driving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedStripConfig {
    pub strip_number: u32,
    pub esp32_id: String,
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_reconnect_period_ms() -> u64 {
    5_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_url: None,
            client_id: None,
            name: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_period_ms: default_reconnect_period_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            topics: TopicConfig::default(),
            led_strips: Vec::new(),
        }
    }
}

impl MqttConfig {
    /// Configured client id, or a generated `museum-kiosk-<millis>` id.
    pub fn effective_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("museum-kiosk-{}", chrono::Utc::now().timestamp_millis()))
    }

    /// Kiosk name reported alongside the client id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    /// Strip configuration for a strip number.
    pub fn strip(&self, strip_number: u32) -> Option<&LedStripConfig> {
        self.led_strips.iter().find(|s| s.strip_number == strip_number)
    }
}
