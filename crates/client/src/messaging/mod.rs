//! MQTT messaging to the exhibit LED hardware.
//!
//! ### Connection state
//! - `Disabled`: messaging switched off in configuration; nothing is sent.
//! - `Connecting` → `Connected` on broker acknowledgement.
//! - `Disconnected` after a connection error or close, until the next
//!   acknowledgement. Each reconnect attempt is counted; reaching the
//!   configured maximum ends the session (`Failed`).
//!
//! ### Publishing
//! - Only while `Connected`; otherwise `publish` returns `false` and
//!   nothing is transmitted.
//! - JSON strings are sent raw, any other JSON value serialized.
//!
//! ### Subscriptions
//! - Handlers are kept in a registry and survive reconnects; every filter
//!   is subscribed again on each acknowledgement.

pub mod error;
pub mod led;
pub mod mqtt;
pub mod registry;

pub use error::MessagingError;
pub use led::{LedSegment, LightAction, LightbulbCommand, Rgb};
pub use mqtt::{MqttTransport, Transport};
pub use registry::{Handler, Message, SubscriptionId};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use kiosk_core::config::MqttConfig;
use serde_json::{Map, Value, json};

use crate::content::Exhibit;
use registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disabled,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    /// Whether the session may still (re)connect.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Disabled | Self::Failed)
    }
}

struct Inner {
    state: ConnectionState,
    reconnect_attempts: u32,
    /// Set once `disconnect` was requested; the event loop stops on it.
    closed: bool,
    transport: Option<Arc<dyn Transport>>,
    registry: Registry,
}

/// One broker session and its subscriptions.
pub struct MessagingClient {
    config: MqttConfig,
    client_id: String,
    inner: Mutex<Inner>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl MessagingClient {
    fn with_transport(config: MqttConfig, transport: Option<Arc<dyn Transport>>) -> Self {
        let state = if transport.is_some() { ConnectionState::Connecting } else { ConnectionState::Disabled };
        let client_id = config.effective_client_id();
        Self {
            config,
            client_id,
            inner: Mutex::new(Inner {
                state,
                reconnect_attempts: 0,
                closed: false,
                transport,
                registry: Registry::default(),
            }),
        }
    }

    /// A client that never connects; every publish reports `false`.
    pub fn disabled(config: MqttConfig) -> Self {
        Self::with_transport(config, None)
    }

    /// A client over an already opened transport, waiting for `on_connect`.
    pub fn new(config: MqttConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_transport(config, Some(transport))
    }

    /// Connect to the configured broker and drive the session in the
    /// background. Returns a disabled client when messaging is off.
    pub fn start(config: MqttConfig) -> Result<Arc<Self>, MessagingError> {
        if !config.enabled {
            tracing::info!("messaging disabled in configuration");
            return Ok(Arc::new(Self::disabled(config)));
        }

        let client_id = config.effective_client_id();
        let (transport, event_loop) = mqtt::connect(&config, &client_id)?;
        let reconnect_period = Duration::from_millis(config.reconnect_period_ms);

        let client = Arc::new(Self::new(MqttConfig { client_id: Some(client_id), ..config }, transport));
        tokio::spawn(mqtt::drive(Arc::clone(&client), event_loop, reconnect_period));

        tracing::info!(client_id = %client.client_id, "messaging client started");
        Ok(client)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().reconnect_attempts
    }

    /// Broker acknowledged the connection.
    pub fn on_connect(&self) {
        let (transport, filters) = {
            let mut inner = self.lock();
            if matches!(inner.state, ConnectionState::Disabled | ConnectionState::Failed) || inner.closed {
                return;
            }
            inner.state = ConnectionState::Connected;
            inner.reconnect_attempts = 0;
            (inner.transport.clone(), inner.registry.filters())
        };
        tracing::info!(client_id = %self.client_id, "mqtt connected");

        if let Some(transport) = transport {
            for filter in filters {
                if let Err(e) = transport.subscribe(&filter) {
                    tracing::warn!(filter = %filter, error = %e, "resubscribe failed");
                }
            }
        }
        self.publish_status("connected");
    }

    pub fn on_error(&self, error: &str) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connected || inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
        }
        tracing::error!(client_id = %self.client_id, error, "mqtt connection error");
    }

    pub fn on_close(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connected || inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
            tracing::info!(client_id = %self.client_id, "mqtt connection closed");
        }
    }

    /// A reconnect attempt is starting. Returns `false` once the attempt
    /// budget is spent; the session is then ended.
    pub fn on_reconnect(&self) -> bool {
        let transport = {
            let mut inner = self.lock();
            if matches!(inner.state, ConnectionState::Disabled | ConnectionState::Failed) || inner.closed {
                return false;
            }
            inner.reconnect_attempts += 1;
            tracing::info!(attempt = inner.reconnect_attempts, "mqtt reconnecting");
            if inner.reconnect_attempts < self.config.max_reconnect_attempts {
                return true;
            }
            inner.state = ConnectionState::Failed;
            inner.transport.clone()
        };

        tracing::error!(max = self.config.max_reconnect_attempts, "max mqtt reconnection attempts reached");
        if let Some(transport) = transport
            && let Err(e) = transport.disconnect()
        {
            tracing::debug!(error = %e, "ending failed session");
        }
        false
    }

    fn connected_transport(&self) -> Option<Arc<dyn Transport>> {
        let inner = self.lock();
        match inner.state {
            ConnectionState::Connected => inner.transport.clone(),
            _ => None,
        }
    }

    /// Publish a payload; `false` when not connected or the transport refused.
    pub fn publish(&self, topic: &str, payload: &Value) -> bool {
        let Some(transport) = self.connected_transport() else {
            tracing::warn!(topic, "mqtt client not connected, cannot publish message");
            return false;
        };

        let bytes = match payload {
            Value::String(text) => text.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        };
        match transport.publish(topic, bytes) {
            Ok(()) => {
                tracing::debug!(topic, "mqtt published");
                true
            }
            Err(e) => {
                tracing::warn!(topic, error = %e, "mqtt publish failed");
                false
            }
        }
    }

    /// Register `handler` for `filter`. The broker subscription is made now
    /// when connected, otherwise on the next acknowledgement.
    pub fn subscribe(
        &self, filter: &str, handler: impl Fn(&str, &Message) + Send + Sync + 'static,
    ) -> Option<SubscriptionId> {
        if !registry::is_valid_filter(filter) {
            tracing::warn!(filter, "invalid topic filter");
            return None;
        }

        let (id, transport) = {
            let mut inner = self.lock();
            if matches!(inner.state, ConnectionState::Disabled | ConnectionState::Failed) {
                tracing::warn!(filter, state = inner.state.as_str(), "cannot subscribe");
                return None;
            }
            let first = !inner.registry.has_filter(filter);
            let id = inner.registry.add(filter, Arc::new(handler));
            let transport = match inner.state {
                ConnectionState::Connected if first => inner.transport.clone(),
                _ => None,
            };
            (id, transport)
        };

        if let Some(transport) = transport {
            match transport.subscribe(filter) {
                Ok(()) => tracing::info!(filter, "subscribed"),
                Err(e) => tracing::warn!(filter, error = %e, "subscribe failed"),
            }
        }
        Some(id)
    }

    /// Remove one handler. The broker subscription is dropped with the
    /// filter's last handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let (filter, transport) = {
            let mut inner = self.lock();
            let Some(filter) = inner.registry.remove(id) else {
                return false;
            };
            let transport = match inner.state {
                ConnectionState::Connected if !inner.registry.has_filter(&filter) => inner.transport.clone(),
                _ => None,
            };
            (filter, transport)
        };

        if let Some(transport) = transport
            && let Err(e) = transport.unsubscribe(&filter)
        {
            tracing::warn!(filter = %filter, error = %e, "unsubscribe failed");
        }
        true
    }

    /// Deliver an inbound message; returns how many handlers ran.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let handlers = self.lock().registry.handlers_for(topic);
        if handlers.is_empty() {
            tracing::debug!(topic, "no handler for message");
            return 0;
        }
        let message = Message::decode(payload);
        for handler in &handlers {
            handler(topic, &message);
        }
        handlers.len()
    }

    fn topic<'a>(&self, topic: Option<&'a str>, name: &'static str) -> Option<&'a str> {
        if topic.is_none() {
            tracing::warn!(error = %MessagingError::TopicNotConfigured(name), "cannot publish");
        }
        topic
    }

    fn kiosk(&self) -> Value {
        json!({ "id": self.client_id, "name": self.config.display_name() })
    }

    /// Light up (or switch off) the LED segment of an exhibit.
    pub fn publish_lightbulb_event(&self, exhibit: &Exhibit, action: LightAction) -> bool {
        let Some(base) = self.topic(self.config.topics.lightbulb_topic_base.as_deref(), "lightbulb_topic_base") else {
            return false;
        };
        let segment = match LedSegment::locate(&exhibit.id, exhibit.led_position.as_ref(), &self.config.led_strips) {
            Ok(segment) => segment,
            Err(e) => {
                tracing::warn!(exhibit = %exhibit.id, error = %e, "no LED segment for exhibit");
                return false;
            }
        };

        let command = LightbulbCommand::new(exhibit, action, &segment, now());
        match serde_json::to_value(&command) {
            Ok(payload) => self.publish(&segment.topic(base), &payload),
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode LED command");
                false
            }
        }
    }

    /// Generic LED command with extra parameters merged into the message.
    pub fn publish_led_command(&self, command: &str, params: Map<String, Value>) -> bool {
        let Some(topic) = self.topic(self.config.topics.lightbulb_topic.as_deref(), "lightbulb_topic") else {
            return false;
        };
        let mut message = Map::new();
        message.insert("command".into(), json!(command));
        message.insert("timestamp".into(), json!(now()));
        message.extend(params);
        self.publish(topic, &Value::Object(message))
    }

    pub fn publish_led_effect(&self, effect: &str, color: Option<Rgb>, duration_ms: Option<u32>) -> bool {
        let params = json!({
            "effect": effect,
            "color": color.unwrap_or(Rgb::WHITE),
            "duration": duration_ms.unwrap_or(led::DEFAULT_EFFECT_DURATION_MS),
            "brightness": led::FULL_BRIGHTNESS,
            "speed": led::DEFAULT_SPEED,
        });
        self.publish_led_command("effect", as_map(params))
    }

    pub fn publish_led_off(&self) -> bool {
        self.publish_led_command("off", Map::new())
    }

    pub fn publish_led_color(&self, color: Rgb, brightness: Option<u8>) -> bool {
        let params = json!({ "color": color, "brightness": brightness.unwrap_or(led::FULL_BRIGHTNESS) });
        self.publish_led_command("solid", as_map(params))
    }

    /// Report a visitor interaction (`type` plus free-form data).
    pub fn publish_interaction(&self, kind: &str, data: Value) -> bool {
        let Some(topic) = self.topic(self.config.topics.interaction_topic.as_deref(), "interaction_topic") else {
            return false;
        };
        let message = json!({ "timestamp": now(), "type": kind, "data": data, "kiosk": self.kiosk() });
        self.publish(topic, &message)
    }

    pub fn publish_status(&self, status: &str) -> bool {
        let Some(topic) = self.topic(self.config.topics.status_topic.as_deref(), "status_topic") else {
            return false;
        };
        let message = json!({ "timestamp": now(), "status": status, "kiosk": self.kiosk() });
        self.publish(topic, &message)
    }

    /// Announce `disconnected` and end the session.
    pub fn disconnect(&self) {
        if self.state() == ConnectionState::Disabled {
            return;
        }
        self.publish_status("disconnected");

        let transport = {
            let mut inner = self.lock();
            inner.closed = true;
            if inner.state != ConnectionState::Failed {
                inner.state = ConnectionState::Disconnected;
            }
            inner.transport.clone()
        };
        if let Some(transport) = transport
            && let Err(e) = transport.disconnect()
        {
            tracing::debug!(error = %e, "disconnect request failed");
        }
        tracing::info!(client_id = %self.client_id, "mqtt client disconnected");
    }
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use kiosk_core::config::{LedStripConfig, TopicConfig};

    use super::*;

    #[derive(Default)]
    struct FakeTransport {
        published: Mutex<Vec<(String, String)>>,
        subscribed: Mutex<Vec<String>>,
        unsubscribed: Mutex<Vec<String>>,
        disconnects: Mutex<u32>,
    }

    impl FakeTransport {
        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }

        fn payloads_on(&self, topic: &str) -> Vec<Value> {
            self.published()
                .into_iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, p)| serde_json::from_str(&p).unwrap())
                .collect()
        }
    }

    impl Transport for FakeTransport {
        fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), String::from_utf8(payload).unwrap()));
            Ok(())
        }

        fn subscribe(&self, filter: &str) -> Result<(), MessagingError> {
            self.subscribed.lock().unwrap().push(filter.to_string());
            Ok(())
        }

        fn unsubscribe(&self, filter: &str) -> Result<(), MessagingError> {
            self.unsubscribed.lock().unwrap().push(filter.to_string());
            Ok(())
        }

        fn disconnect(&self) -> Result<(), MessagingError> {
            *self.disconnects.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn config() -> MqttConfig {
        MqttConfig {
            enabled: true,
            broker_url: Some("mqtt://broker.local".into()),
            client_id: Some("kiosk-eingang".into()),
            name: Some("Eingangshalle".into()),
            topics: TopicConfig {
                lightbulb_topic_base: Some("museum/leds".into()),
                lightbulb_topic: Some("museum/leds/all".into()),
                interaction_topic: Some("museum/interaction".into()),
                status_topic: Some("museum/status".into()),
            },
            led_strips: vec![LedStripConfig { strip_number: 2, esp32_id: "esp32-halle-b".into() }],
            ..Default::default()
        }
    }

    fn client_with(config: MqttConfig) -> (MessagingClient, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        let client = MessagingClient::new(config, Arc::clone(&transport) as Arc<dyn Transport>);
        (client, transport)
    }

    fn connected() -> (MessagingClient, Arc<FakeTransport>) {
        let (client, transport) = client_with(config());
        client.on_connect();
        transport.published.lock().unwrap().clear();
        (client, transport)
    }

    fn exhibit(value: Value) -> Exhibit {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_led_publish_while_not_connected_sends_nothing() {
        let (client, transport) = client_with(config());
        assert_eq!(client.state(), ConnectionState::Connecting);

        let vase = exhibit(json!({
            "_id": "exp-vase",
            "led_position": {"strip_number": 2, "led_start": 0, "led_end": 9}
        }));
        assert!(!client.publish_lightbulb_event(&vase, LightAction::Activate));
        assert!(!client.publish_led_off());
        assert!(!client.publish("museum/raw", &json!("x")));
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_connect_publishes_status() {
        let (client, transport) = client_with(config());
        client.on_connect();

        assert!(client.is_connected());
        let status = transport.payloads_on("museum/status");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0]["status"], "connected");
        assert_eq!(status[0]["kiosk"], json!({"id": "kiosk-eingang", "name": "Eingangshalle"}));
    }

    #[test]
    fn test_publish_strings_raw_and_values_serialized() {
        let (client, transport) = connected();
        assert!(client.publish("museum/raw", &json!("reboot")));
        assert!(client.publish("museum/raw", &json!({"a": 1})));

        assert_eq!(
            transport.published(),
            vec![("museum/raw".to_string(), "reboot".to_string()), ("museum/raw".to_string(), r#"{"a":1}"#.to_string())]
        );
    }

    #[test]
    fn test_lightbulb_event_topic_and_payload() {
        let (client, transport) = connected();
        let globe = exhibit(json!({
            "_id": "exp-globus",
            "titel": "Erdglobus",
            "kategorie": {"_id": "kat-geo", "slug": {"current": "geschichte"}},
            "led_position": {"strip_number": 2, "led_start": 20, "led_end": 29}
        }));

        assert!(client.publish_lightbulb_event(&globe, LightAction::Activate));
        let sent = transport.payloads_on("museum/leds/strip2");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["command"], "activate");
        assert_eq!(sent[0]["led_color"], json!({"r": 255, "g": 165, "b": 0}));
        assert_eq!(sent[0]["led_count"], 10);
        assert_eq!(sent[0]["esp32_id"], "esp32-halle-b");
    }

    #[test]
    fn test_lightbulb_event_without_segment() {
        let (client, transport) = connected();
        assert!(!client.publish_lightbulb_event(&exhibit(json!({"_id": "exp-1"})), LightAction::Activate));

        let unknown_strip = exhibit(json!({"_id": "exp-2", "led_position": {"strip_number": 7, "led_start": 0, "led_end": 1}}));
        assert!(!client.publish_lightbulb_event(&unknown_strip, LightAction::Activate));
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_missing_topic_returns_false() {
        let mut cfg = config();
        cfg.topics = TopicConfig::default();
        let (client, transport) = client_with(cfg);
        client.on_connect();

        assert!(!client.publish_status("online"));
        assert!(!client.publish_interaction("tap", json!({})));
        assert!(!client.publish_led_off());
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_led_helpers() {
        let (client, transport) = connected();
        assert!(client.publish_led_effect("pulse", None, None));
        assert!(client.publish_led_color(Rgb { r: 1, g: 2, b: 3 }, Some(128)));
        assert!(client.publish_led_off());

        let sent = transport.payloads_on("museum/leds/all");
        assert_eq!(sent[0]["command"], "effect");
        assert_eq!(sent[0]["effect"], "pulse");
        assert_eq!(sent[0]["color"], json!({"r": 255, "g": 255, "b": 255}));
        assert_eq!(sent[0]["duration"], 5000);
        assert_eq!(sent[0]["speed"], 50);
        assert_eq!(sent[1]["command"], "solid");
        assert_eq!(sent[1]["brightness"], 128);
        assert_eq!(sent[2]["command"], "off");
        assert!(sent[2]["timestamp"].is_string());
    }

    #[test]
    fn test_interaction_message() {
        let (client, transport) = connected();
        assert!(client.publish_interaction("exhibit_view", json!({"exhibit_id": "exp-1"})));

        let sent = transport.payloads_on("museum/interaction");
        assert_eq!(sent[0]["type"], "exhibit_view");
        assert_eq!(sent[0]["data"]["exhibit_id"], "exp-1");
        assert_eq!(sent[0]["kiosk"]["name"], "Eingangshalle");
    }

    #[test]
    fn test_reconnect_budget() {
        let (client, transport) = connected();
        client.on_error("connection reset");
        client.on_close();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        for attempt in 1..5 {
            assert!(client.on_reconnect(), "attempt {attempt}");
        }
        assert!(!client.on_reconnect());
        assert_eq!(client.state(), ConnectionState::Failed);
        assert_eq!(*transport.disconnects.lock().unwrap(), 1);

        client.on_connect();
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_connect_resets_attempts_and_resubscribes() {
        let (client, transport) = connected();
        client.subscribe("museum/kiosk/+", |_: &str, _: &Message| {}).unwrap();
        client.on_close();
        assert!(client.on_reconnect());
        assert_eq!(client.reconnect_attempts(), 1);

        client.on_connect();
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(*transport.subscribed.lock().unwrap(), vec!["museum/kiosk/+", "museum/kiosk/+"]);
    }

    #[test]
    fn test_subscribe_dispatch_unsubscribe() {
        let (client, transport) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = client
            .subscribe("museum/kiosk/#", move |topic: &str, message: &Message| {
                sink.lock().unwrap().push((topic.to_string(), message.clone()));
            })
            .unwrap();

        assert_eq!(client.dispatch("museum/kiosk/cmd", br#"{"command":"reload"}"#), 1);
        assert_eq!(client.dispatch("museum/kiosk/cmd", b"reload"), 1);
        assert_eq!(client.dispatch("museum/other", b"x"), 0);

        let seen_now = seen.lock().unwrap().clone();
        assert_eq!(seen_now[0].1, Message::Json(json!({"command": "reload"})));
        assert_eq!(seen_now[1].1, Message::Text("reload".into()));

        assert!(client.unsubscribe(id));
        assert!(!client.unsubscribe(id));
        assert_eq!(*transport.unsubscribed.lock().unwrap(), vec!["museum/kiosk/#"]);
        assert_eq!(client.dispatch("museum/kiosk/cmd", b"x"), 0);
    }

    #[test]
    fn test_subscribe_rejects_bad_filter() {
        let (client, _transport) = connected();
        assert!(client.subscribe("museum/#/x", |_: &str, _: &Message| {}).is_none());
    }

    #[test]
    fn test_disabled_client() {
        let client = MessagingClient::disabled(config());
        assert_eq!(client.state(), ConnectionState::Disabled);
        assert!(!client.publish_status("online"));
        assert!(client.subscribe("museum/#", |_: &str, _: &Message| {}).is_none());
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disabled);
    }

    #[test]
    fn test_disconnect_announces_and_closes() {
        let (client, transport) = connected();
        client.disconnect();

        let status = transport.payloads_on("museum/status");
        assert_eq!(status[0]["status"], "disconnected");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.is_closed());
        assert_eq!(*transport.disconnects.lock().unwrap(), 1);
        assert!(!client.publish_status("online"));
    }

    #[tokio::test]
    async fn test_start_disabled_does_not_connect() {
        let client = MessagingClient::start(MqttConfig::default()).unwrap();
        assert_eq!(client.state(), ConnectionState::Disabled);
    }
}
