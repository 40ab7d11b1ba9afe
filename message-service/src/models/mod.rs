use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// A row of the `messages` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub topic: String,
    pub message: String,
}

/// Request payload for produce and update.
///
/// Missing or `null` fields decode as empty strings, and a bare `null` body
/// is an empty payload. Field names match exactly first, then ignoring ASCII
/// case. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub topic: String,
    pub message: String,
}

impl MessagePayload {
    /// Build a payload from an already parsed JSON value
    pub fn from_json(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(fields) => Ok(Self {
                topic: string_field(&fields, "topic")?,
                message: string_field(&fields, "message")?,
            }),
            other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        }
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<String, String> {
    let value = fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    });

    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "field `{}` must be a string, found {}",
            name,
            json_kind(other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A message as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWithTopic {
    pub topic: String,
    pub message: String,
}

impl From<StoredMessage> for MessageWithTopic {
    fn from(stored: StoredMessage) -> Self {
        Self {
            topic: stored.topic,
            message: stored.message,
        }
    }
}
