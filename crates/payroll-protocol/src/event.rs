use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category tag carried in the `type` field of every event.
///
/// Two kinds are infrastructure (`heartbeat`, `connection`) plus the
/// `history` replay; everything else is a domain event. Unknown tags
/// round-trip through `Other` so new publishers need no protocol bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    PayrollSigned,
    Test,
    Heartbeat,
    Connection,
    History,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PayrollSigned => "payroll_signed",
            EventKind::Test => "test",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Connection => "connection",
            EventKind::History => "history",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "payroll_signed" => EventKind::PayrollSigned,
            "test" => EventKind::Test,
            "heartbeat" => EventKind::Heartbeat,
            "connection" => EventKind::Connection,
            "history" => EventKind::History,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        EventKind::from(s.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Immutable record pushed to dashboards.
///
/// Wire: `{ "id": 7, "type": "payroll_signed", "data": {...}, "message": "...", "timestamp": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the hub to published events only; infrastructure events have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
    /// Present only on `history` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

impl Event {
    /// Keep-alive ping. Never throttled, never recorded.
    pub fn heartbeat() -> Self {
        Self::infra(EventKind::Heartbeat, None)
    }

    /// First frame on every freshly opened stream.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::infra(EventKind::Connection, Some(message.into()))
    }

    /// Backlog replay for a new joiner, oldest entry first.
    pub fn history(snapshot: Vec<Event>) -> Self {
        let message = format!("Sent {} recent events", snapshot.len());
        let mut ev = Self::infra(EventKind::History, Some(message));
        ev.events = Some(snapshot);
        ev
    }

    fn infra(kind: EventKind, message: Option<String>) -> Self {
        Self {
            id: None,
            kind,
            data: empty_object(),
            message,
            timestamp: now_timestamp(),
            events: None,
        }
    }

    /// Serialized form placed after `data: ` in the SSE frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What a publisher hands to the hub; the hub stamps `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub data: Value,
    pub message: Option<String>,
}

impl EventDraft {
    pub fn new(kind: impl Into<EventKind>) -> Self {
        Self {
            kind: kind.into(),
            data: empty_object(),
            message: None,
        }
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).unwrap_or_else(|_| empty_object());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Complete the draft into an event accepted right now.
    pub fn into_event(self, id: u64) -> Event {
        Event {
            id: Some(id),
            kind: self.kind,
            data: self.data,
            message: self.message,
            timestamp: now_timestamp(),
            events: None,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// RFC 3339 UTC with millisecond precision, e.g. `2026-01-31T08:15:00.123Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
