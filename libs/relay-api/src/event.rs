use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// ════════════════════════════════════════════════════════════════
//  EventType
// ════════════════════════════════════════════════════════════════

/// Tag carried in the `eventType` field.
///
/// Unknown tags are kept verbatim so that consumers never reject an event
/// only because a newer producer introduced a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A session token row was inserted.
    TokenCreated,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::TokenCreated => "TOKEN_CREATED",
            EventType::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "TOKEN_CREATED" => EventType::TokenCreated,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EventType::from(tag.as_str()))
    }
}

// ════════════════════════════════════════════════════════════════
//  ChangeEvent
// ════════════════════════════════════════════════════════════════

/// Unit of asynchronous notification, built by a collaborator right after
/// a successful local mutation.
///
/// `timestamp` belongs to the publisher: whatever the caller puts there is
/// replaced at send time (see [`ChangeEvent::stamp`]). Canonical keys in
/// `extra` never reach the wire; the typed field always wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub source: String,
    pub event_type: EventType,
    pub table: String,
    pub user_id: Option<String>,
    pub username: String,
    /// Event-specific fields (e.g. `token`), flattened into the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChangeEvent {
    /// Wire names of the typed fields.
    pub const CANONICAL_FIELDS: [&'static str; 6] =
        ["timestamp", "source", "eventType", "table", "userId", "username"];

    pub fn new(
        source: impl Into<String>,
        event_type: EventType,
        table: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: None,
            source: source.into(),
            event_type,
            table: table.into(),
            user_id: None,
            username: String::new(),
            extra: Map::new(),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>, username: impl Into<String>) -> Self {
        self.user_id = user_id;
        self.username = username.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Overwrite `timestamp` with the publish time.
    pub fn stamp(&mut self, timestamp: String) {
        self.timestamp = Some(timestamp);
    }

    /// Serialize to the UTF-8 JSON wire payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        if !self.extra.keys().any(|k| Self::is_canonical(k)) {
            return serde_json::to_vec(self);
        }
        let mut wire = self.clone();
        wire.extra.retain(|k, _| !Self::is_canonical(k));
        serde_json::to_vec(&wire)
    }

    fn is_canonical(key: &str) -> bool {
        Self::CANONICAL_FIELDS.contains(&key)
    }
}

// ════════════════════════════════════════════════════════════════
//  EventSummary
// ════════════════════════════════════════════════════════════════

/// Canonical fields extracted from a parsed payload.
///
/// Extraction is lenient: a field that is missing or null becomes `None`,
/// numbers and booleans are rendered as text (numeric `userId`s are common
/// when the id comes straight from a database row).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub timestamp: Option<String>,
    pub source: Option<String>,
    pub event_type: Option<String>,
    pub table: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl EventSummary {
    pub fn from_value(value: &Value) -> Self {
        Self {
            timestamp: field_text(value, "timestamp"),
            source: field_text(value, "source"),
            event_type: field_text(value, "eventType"),
            table: field_text(value, "table"),
            user_id: field_text(value, "userId"),
            username: field_text(value, "username"),
        }
    }
}

fn field_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
