//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded with a `type` tag and snake_case names.
//! Document payloads reuse the engine's wire types.

use daybook_engine::{DocumentWrite, Fields, Snapshot};
use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a collection.
    Subscribe {
        collection: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Stop receiving snapshots of a collection.
    Unsubscribe {
        collection: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Add a document with a server-assigned id.
    Add {
        collection: String,
        document: DocumentWrite,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Merge fields into an existing document.
    Update {
        collection: String,
        id: String,
        fields: Fields,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Delete a document.
    Delete {
        collection: String,
        id: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full contents of a subscribed collection.
    Snapshot { snapshot: Snapshot },

    /// A request succeeded. `id` names the affected document, if any.
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Response to ping.
    Pong,

    /// Error response.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }

    pub fn ack(id: Option<String>, request_id: Option<String>) -> Self {
        ServerMessage::Ack { id, request_id }
    }

    pub fn snapshot(snapshot: Snapshot) -> Self {
        ServerMessage::Snapshot { snapshot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_subscribe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","collection":"todos"}"#).unwrap();
        match msg {
            ClientMessage::Subscribe {
                collection,
                request_id,
            } => {
                assert_eq!(collection, "todos");
                assert!(request_id.is_none());
            }
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_parse_add_with_server_timestamp() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "add",
            "collection": "todos",
            "document": {
                "fields": {"task": "Ship", "completed": false},
                "serverTimestamps": ["createdAt"]
            },
            "request_id": "r1"
        }))
        .unwrap();

        match msg {
            ClientMessage::Add {
                document,
                request_id,
                ..
            } => {
                assert_eq!(document.server_timestamps, vec!["createdAt".to_string()]);
                assert_eq!(request_id.as_deref(), Some("r1"));
            }
            _ => panic!("Expected Add"),
        }
    }

    #[test]
    fn test_serialize_error_omits_missing_request_id() {
        let value = serde_json::to_value(ServerMessage::error("boom", None)).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "boom"}));
    }

    #[test]
    fn test_serialize_pong() {
        let text = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);
    }
}
