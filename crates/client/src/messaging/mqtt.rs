//! Broker transport over rumqttc.

use std::sync::Arc;
use std::time::Duration;

use kiosk_core::config::MqttConfig;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use url::Url;

use super::{MessagingClient, MessagingError};

const REQUEST_CAPACITY: usize = 64;

/// Outbound half of a broker connection.
///
/// Calls only enqueue; delivery happens on the connection's event loop.
pub trait Transport: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError>;
    fn subscribe(&self, filter: &str) -> Result<(), MessagingError>;
    fn unsubscribe(&self, filter: &str) -> Result<(), MessagingError>;
    fn disconnect(&self) -> Result<(), MessagingError>;
}

/// rumqttc client handle.
pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MessagingError::Transport(e.to_string()))
    }

    fn subscribe(&self, filter: &str) -> Result<(), MessagingError> {
        self.client
            .try_subscribe(filter, QoS::AtMostOnce)
            .map_err(|e| MessagingError::Transport(e.to_string()))
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), MessagingError> {
        self.client
            .try_unsubscribe(filter)
            .map_err(|e| MessagingError::Transport(e.to_string()))
    }

    fn disconnect(&self) -> Result<(), MessagingError> {
        self.client
            .try_disconnect()
            .map_err(|e| MessagingError::Transport(e.to_string()))
    }
}

/// Broker address from `mqtt://`, `tcp://`, `mqtts://` or `ssl://` URLs.
///
/// Returns host, port and whether TLS is required.
pub fn parse_broker_url(raw: &str) -> Result<(String, u16, bool), MessagingError> {
    let url = Url::parse(raw).map_err(|e| MessagingError::InvalidBrokerUrl(format!("{raw}: {e}")))?;
    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        other => return Err(MessagingError::InvalidBrokerUrl(format!("unsupported scheme {other}"))),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MessagingError::InvalidBrokerUrl(format!("{raw}: missing host")))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });
    Ok((host.to_string(), port, tls))
}

/// Connection options for `client_id`.
pub fn mqtt_options(config: &MqttConfig, client_id: &str) -> Result<MqttOptions, MessagingError> {
    let broker = config
        .broker_url
        .as_deref()
        .ok_or_else(|| MessagingError::InvalidBrokerUrl("broker_url is not set".into()))?;
    let (host, port, tls) = parse_broker_url(broker)?;

    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    if tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }
    Ok(options)
}

/// Open a broker connection and drive it on a background task.
pub(super) fn connect(
    config: &MqttConfig, client_id: &str,
) -> Result<(Arc<dyn Transport>, EventLoop), MessagingError> {
    let options = mqtt_options(config, client_id)?;
    let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
    Ok((Arc::new(MqttTransport { client }), event_loop))
}

/// Feed connection events into the client until the session ends.
pub(super) async fn drive(client: Arc<MessagingClient>, mut event_loop: EventLoop, reconnect_period: Duration) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) if ack.code == ConnectReturnCode::Success => client.on_connect(),
            Ok(Event::Incoming(Packet::ConnAck(ack))) => client.on_error(&format!("connection refused: {:?}", ack.code)),
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                client.dispatch(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => client.on_close(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("mqtt disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if client.is_closed() {
                    break;
                }
                client.on_error(&e.to_string());
                client.on_close();
                tokio::time::sleep(reconnect_period).await;
                if !client.on_reconnect() {
                    break;
                }
            }
        }
    }
    tracing::debug!("mqtt event loop stopped");
}
