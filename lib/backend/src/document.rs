//! Documents as exchanged with the document store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Sentinel value asking the store to write its own clock into a field.
///
/// Stores replace any top-level field holding this string with the
/// write time in microseconds since the Unix epoch.
pub const SERVER_TIMESTAMP: &str = "$serverTimestamp";

/// A stored document: its key within the collection plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document key, unique within its collection.
    pub id: String,
    /// Document fields.
    pub fields: Fields,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a string field, if present and a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Deserializes the fields into a typed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields do not match the record's shape.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Replaces every [`SERVER_TIMESTAMP`] sentinel with `now_micros`.
pub fn resolve_server_values(fields: &mut Fields, now_micros: i64) {
    for value in fields.values_mut() {
        if value.as_str() == Some(SERVER_TIMESTAMP) {
            *value = Value::from(now_micros);
        }
    }
}
