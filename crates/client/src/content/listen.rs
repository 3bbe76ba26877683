//! Change notifications over the Content API listen endpoint.
//!
//! The endpoint answers with a server-sent-events stream that stays open.
//! A background task parses it and forwards typed events through a channel;
//! dropping the [`Subscription`] aborts the task and closes the connection.

use futures_util::StreamExt;
use reqwest::header;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use super::ContentError;

const CHANNEL_CAPACITY: usize = 32;

/// One raw server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser.
///
/// Bytes are buffered until a full line is available, so chunks may split
/// lines (and UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    current: SseEvent,
    has_data: bool,
}

impl SseParser {
    /// Feed a chunk; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if self.has_data || !self.current.event.is_empty() {
                    events.push(std::mem::take(&mut self.current));
                }
                self.has_data = false;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.current.event = value.to_string(),
                "data" => {
                    if self.has_data {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                    self.has_data = true;
                }
                "id" => self.current.id = Some(value.to_string()),
                _ => {}
            }
        }

        events
    }
}

/// A document change.
#[derive(Debug, Clone, Deserialize)]
pub struct Mutation {
    #[serde(rename = "documentId")]
    pub document_id: String,
    #[serde(rename = "eventId", default)]
    pub event_id: Option<String>,
    /// `appear`, `update` or `disappear`.
    #[serde(default)]
    pub transition: Option<String>,
    /// Document after the change, when the listener asked for it.
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum ListenEvent {
    Welcome { listener_name: Option<String> },
    Mutation(Mutation),
    /// Server asks the client to reconnect.
    Reconnect,
    /// Server closed the listener; no further events follow.
    Disconnect { reason: Option<String> },
    ChannelError { message: String },
}

impl ListenEvent {
    /// Interpret a raw event. Unknown event names yield `None`.
    pub fn from_sse(event: &SseEvent) -> Result<Option<Self>, ContentError> {
        let data = || -> Result<Value, ContentError> {
            if event.data.is_empty() { Ok(Value::Null) } else { Ok(serde_json::from_str(&event.data)?) }
        };
        let field = |value: &Value, name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        let parsed = match event.event.as_str() {
            "welcome" => Self::Welcome { listener_name: field(&data()?, "listenerName") },
            "mutation" => Self::Mutation(serde_json::from_str(&event.data)?),
            "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect { reason: field(&data()?, "reason") },
            "channelError" => Self::ChannelError {
                message: field(&data()?, "message").unwrap_or_else(|| event.data.clone()),
            },
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnect { .. } | Self::Reconnect)
    }
}

/// Live change notifications. Cancelled by [`Subscription::cancel`] or drop.
pub struct Subscription {
    events: mpsc::Receiver<Result<ListenEvent, ContentError>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(http: reqwest::Client, url: Url) -> Self {
        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(pump(http, url, tx));
        Self { events, task }
    }

    /// Next event; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<ListenEvent, ContentError>> {
        self.events.recv().await
    }

    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn pump(http: reqwest::Client, url: Url, tx: mpsc::Sender<Result<ListenEvent, ContentError>>) {
    let response = match http
        .get(url.as_str())
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let _ = tx.send(Err(ContentError::HttpError { status: response.status().as_u16() })).await;
            return;
        }
        Err(e) => {
            let _ = tx.send(Err(e.into())).await;
            return;
        }
    };

    tracing::debug!(url = %url, "listening for changes");

    let mut parser = SseParser::default();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };

        for raw in parser.push(&chunk) {
            let event = match ListenEvent::from_sse(&raw) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(event = %raw.event, error = %e, "unparseable listen event");
                    continue;
                }
            };
            let terminal = event.is_terminal();
            if tx.send(Ok(event)).await.is_err() || terminal {
                return;
            }
        }
    }

    tracing::debug!(url = %url, "listen stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: welc").is_empty());
        assert!(parser.push(b"ome\ndata: {\"listenerName\":").is_empty());
        let events = parser.push(b"\"abc\"}\n\n");

        assert_eq!(
            events,
            vec![SseEvent { event: "welcome".into(), data: r#"{"listenerName":"abc"}"#.into(), id: None }]
        );
    }

    #[test]
    fn test_parser_comments_crlf_and_multiline_data() {
        let mut parser = SseParser::default();
        let events = parser.push(b": keepalive\r\n\r\nid: 7\r\nevent: mutation\r\ndata: a\r\ndata:b\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "mutation");
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parser_split_utf8() {
        let payload = "event: mutation\ndata: Jugendstilvase für Halle 2\n\n".as_bytes();
        let split = payload.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::default();
        assert!(parser.push(&payload[..split]).is_empty());
        let events = parser.push(&payload[split..]);
        assert_eq!(events[0].data, "Jugendstilvase für Halle 2");
    }

    #[test]
    fn test_mutation_event() {
        let raw = SseEvent {
            event: "mutation".into(),
            data: r#"{"documentId":"exp-vase","eventId":"tx#exp-vase","transition":"update","result":{"_id":"exp-vase"}}"#.into(),
            id: None,
        };
        match ListenEvent::from_sse(&raw).unwrap() {
            Some(ListenEvent::Mutation(m)) => {
                assert_eq!(m.document_id, "exp-vase");
                assert_eq!(m.transition.as_deref(), Some("update"));
                assert!(m.result.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_terminal_and_unknown_events() {
        let disconnect = SseEvent { event: "disconnect".into(), data: r#"{"reason":"timeout"}"#.into(), id: None };
        let event = ListenEvent::from_sse(&disconnect).unwrap().unwrap();
        assert!(matches!(&event, ListenEvent::Disconnect { reason } if reason.as_deref() == Some("timeout")));
        assert!(event.is_terminal());

        let unknown = SseEvent { event: "ping".into(), ..Default::default() };
        assert!(ListenEvent::from_sse(&unknown).unwrap().is_none());

        let broken = SseEvent { event: "mutation".into(), data: "{".into(), id: None };
        assert!(matches!(ListenEvent::from_sse(&broken), Err(ContentError::Parse(_))));
    }
}
