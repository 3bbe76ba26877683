//! Inbound message handlers keyed by topic filter.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Decoded inbound payload: JSON when it parses, text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Json(Value),
    Text(String),
}

impl Message {
    pub fn decode(payload: &[u8]) -> Self {
        match serde_json::from_slice(payload) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(payload).into_owned()),
        }
    }
}

/// Handler invoked with the concrete topic and the decoded payload.
pub type Handler = Arc<dyn Fn(&str, &Message) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    filter: String,
    handler: Handler,
}

/// Ordered subscription table. Handlers for a topic run in registration order.
#[derive(Default)]
pub struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("filters", &self.filters()).finish()
    }
}

impl Registry {
    pub fn add(&mut self, filter: &str, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Entry { id, filter: filter.to_string(), handler });
        id
    }

    /// Remove a handler; returns its filter.
    pub fn remove(&mut self, id: SubscriptionId) -> Option<String> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos).filter)
    }

    pub fn has_filter(&self, filter: &str) -> bool {
        self.entries.iter().any(|e| e.filter == filter)
    }

    /// Distinct filters in first-registration order.
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !filters.contains(&entry.filter) {
                filters.push(entry.filter.clone());
            }
        }
        filters
    }

    pub fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.entries
            .iter()
            .filter(|e| topic_matches(&e.filter, topic))
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `+` must fill a whole level; `#` must be the whole last level.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(i, level)| match *level {
        "#" => i == levels.len() - 1,
        "+" => true,
        other => !other.contains(['+', '#']),
    })
}

/// MQTT topic matching with `+` (one level) and `#` (rest) wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
