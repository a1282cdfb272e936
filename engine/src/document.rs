//! Document types exchanged with a hosted document backend.
//!
//! Field values are JSON. Timestamps are epoch milliseconds.

use crate::{CollectionName, DocumentId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A stored document with its server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// A resolved timestamp field. `None` when unset, null, or not a number.
    pub fn get_timestamp(&self, field: &str) -> Option<Timestamp> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}

/// A new document to write.
///
/// Fields named in `server_timestamps` are stamped by the backend with its
/// own clock when the write is committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWrite {
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Mark a field to be stamped with the commit time.
    pub fn server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.server_timestamps.push(name.into());
        self
    }

    /// Resolve into stored fields, stamping server timestamps with `now`.
    pub fn resolve(self, now: Timestamp) -> Fields {
        let mut fields = self.fields;
        for name in self.server_timestamps {
            fields.insert(name, Value::from(now));
        }
        fields
    }
}

/// A complete point-in-time view of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub collection: CollectionName,
    pub documents: Vec<Document>,
    /// When the backend produced this view
    pub read_time: Timestamp,
}
