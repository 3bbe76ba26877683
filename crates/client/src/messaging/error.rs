//! Messaging client error types.

/// Errors from the MQTT messaging client.
///
/// Public publish helpers report failure as `false` and log one of these;
/// they surface as values only from construction and the transport seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("messaging disabled")]
    Disabled,

    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("not connected")]
    NotConnected,

    #[error("topic not configured: {0}")]
    TopicNotConfigured(&'static str),

    #[error("invalid topic filter: {0}")]
    InvalidTopic(String),

    /// The exhibit has no complete LED position.
    #[error("no LED position for exhibit {0}")]
    NoLedPosition(String),

    #[error("no strip configuration for strip {0}")]
    UnknownStrip(u32),

    #[error("invalid LED segment {start}..={end}")]
    InvalidSegment { start: u32, end: u32 },

    #[error("transport error: {0}")]
    Transport(String),
}
