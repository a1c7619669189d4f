use crate::level::Level;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "message";
pub const TIME_KEY: &str = "time";
pub const ERROR_KEY: &str = "error";
pub const REQUEST_ID_KEY: &str = "request_id";
pub const PATH_KEY: &str = "path";
pub const STATUS_CODE_KEY: &str = "status_code";
pub const LATENCY_KEY: &str = "latency";
pub const METHOD_KEY: &str = "method";
pub const REQUEST_KEY: &str = "request";
pub const RESPONSE_KEY: &str = "response";
pub const RESPONSE_ERROR_KEY: &str = "response_error";
pub const REMOTE_ADDRESS_KEY: &str = "remote_address";
pub const REQUEST_USER_UID_KEY: &str = "request_user_uid";

/// Well-known field names with a fixed meaning on the wire.
pub const RESERVED_KEYS: [&str; 14] = [
    LEVEL_KEY,
    MESSAGE_KEY,
    TIME_KEY,
    ERROR_KEY,
    REQUEST_ID_KEY,
    PATH_KEY,
    STATUS_CODE_KEY,
    LATENCY_KEY,
    METHOD_KEY,
    REQUEST_KEY,
    RESPONSE_KEY,
    RESPONSE_ERROR_KEY,
    REMOTE_ADDRESS_KEY,
    REQUEST_USER_UID_KEY,
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_KEYS.contains(&name)
}

/// Name under which a caller-supplied field is stored.
///
/// A reserved name keeps its meaning only for string values; anything else
/// is moved to `custom_<name>` so it cannot collide with the well-known field.
pub(crate) fn correct_field_name(name: String, value: &Value) -> String {
    if is_reserved(&name) && !value.is_string() {
        format!("custom_{}", name)
    } else {
        name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered field sequence with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<Field>);

impl Fields {
    pub fn new() -> Self {
        Fields(Vec::new())
    }

    /// Set `name` to `value`, overwriting an existing entry in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.0.push(Field { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.0.iter()
    }

    /// Flat JSON object, field name to value.
    pub fn to_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_map())
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.set(k, v);
        }
        fields
    }
}

/// One logging event. Built fresh on every emitted call and never mutated
/// after it has been formatted.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Baseline and call fields followed by `level`, `message` and `time`.
    pub fields: Fields,
}

impl Record {
    pub(crate) fn compose(
        level: Level,
        message: String,
        mut fields: Fields,
        timestamp: DateTime<Utc>,
    ) -> Self {
        fields.set(LEVEL_KEY, level.as_str());
        fields.set(MESSAGE_KEY, message.as_str());
        fields.set(
            TIME_KEY,
            timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
        Record {
            level,
            message,
            timestamp,
            fields,
        }
    }
}

/// Response summary attached to request logs under the `response` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    pub status: String,
    pub error_code: String,
    pub description: String,
    pub payload: Value,
}

impl From<ResponseDescriptor> for Value {
    fn from(r: ResponseDescriptor) -> Self {
        serde_json::json!({
            "status": r.status,
            "error_code": r.error_code,
            "description": r.description,
            "payload": r.payload,
        })
    }
}
