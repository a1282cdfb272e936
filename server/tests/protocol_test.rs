//! Wire protocol tests from the client's side.
//!
//! These mirror the JSON a client exchanges with the server over `/ws` and
//! the HTTP routes, and check it against the engine's document types. No
//! database is needed.

use chrono::{TimeZone, Utc};
use daybook_engine::remote::todos_from_snapshot;
use daybook_engine::{Document, DocumentWrite, Fields, Snapshot};
use serde_json::{json, Value};

/// Client-side view of the messages a client sends.
#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)]
enum Outgoing {
    Subscribe {
        collection: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Add {
        collection: String,
        document: DocumentWrite,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
    Ping,
}

/// Client-side view of the messages the server sends.
#[derive(serde::Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Incoming {
    Snapshot {
        snapshot: Snapshot,
    },
    Ack {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
    Pong,
    Error {
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
}

fn todo_doc(id: &str, task: &str, completed: bool, created_at: i64) -> Document {
    let mut fields = Fields::new();
    fields.insert("task".to_string(), json!(task));
    fields.insert("completed".to_string(), json!(completed));
    fields.insert("createdAt".to_string(), json!(created_at));
    Document::new(id, fields)
}

#[test]
fn test_subscribe_message_format() {
    let msg = Outgoing::Subscribe {
        collection: "todos".to_string(),
        request_id: Some("req-1".to_string()),
    };

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        value,
        json!({"type": "subscribe", "collection": "todos", "request_id": "req-1"})
    );
}

#[test]
fn test_add_message_carries_server_timestamps() {
    let write = DocumentWrite::new()
        .field("task", "Ship release")
        .field("completed", false)
        .server_timestamp("createdAt");

    let msg = Outgoing::Add {
        collection: "todos".to_string(),
        document: write,
        request_id: None,
    };

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "add");
    assert_eq!(value["document"]["fields"]["task"], "Ship release");
    assert_eq!(value["document"]["serverTimestamps"], json!(["createdAt"]));
}

#[test]
fn test_update_and_delete_format() {
    let mut fields = Fields::new();
    fields.insert("completed".to_string(), json!(true));

    let update = serde_json::to_value(Outgoing::Update {
        collection: "todos".to_string(),
        id: "abc".to_string(),
        fields,
    })
    .unwrap();
    assert_eq!(
        update,
        json!({"type": "update", "collection": "todos", "id": "abc", "fields": {"completed": true}})
    );

    let delete = serde_json::to_value(Outgoing::Delete {
        collection: "todos".to_string(),
        id: "abc".to_string(),
    })
    .unwrap();
    assert_eq!(
        delete,
        json!({"type": "delete", "collection": "todos", "id": "abc"})
    );

    let ping = serde_json::to_string(&Outgoing::Ping).unwrap();
    assert_eq!(ping, r#"{"type":"ping"}"#);
}

#[test]
fn test_parse_snapshot_push() {
    let text = r#"{
        "type": "snapshot",
        "snapshot": {
            "collection": "todos",
            "documents": [
                {"id": "a", "fields": {"task": "Old", "completed": true, "createdAt": 1000}},
                {"id": "b", "fields": {"task": "New", "completed": false, "createdAt": 2000}}
            ],
            "readTime": 3000
        }
    }"#;

    let msg: Incoming = serde_json::from_str(text).unwrap();
    let Incoming::Snapshot { snapshot } = msg else {
        panic!("Expected Snapshot");
    };

    assert_eq!(snapshot.collection, "todos");
    assert_eq!(snapshot.read_time, 3000);
    assert_eq!(snapshot.documents.len(), 2);

    // Display order is newest first
    let now = Utc.timestamp_millis_opt(5000).unwrap();
    let todos = todos_from_snapshot(&snapshot, now);
    assert_eq!(todos[0].task, "New");
    assert_eq!(todos[1].task, "Old");
    assert!(todos[1].completed);
}

#[test]
fn test_snapshot_roundtrips_through_engine_types() {
    let snapshot = Snapshot {
        collection: "todos".to_string(),
        documents: vec![
            todo_doc("a", "Water plants", false, 1_706_745_600_000),
            todo_doc("b", "Call mom", true, 1_706_745_660_000),
        ],
        read_time: 1_706_745_700_000,
    };

    let text = json!({"type": "snapshot", "snapshot": snapshot}).to_string();
    let parsed: Incoming = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, Incoming::Snapshot { snapshot });
}

#[test]
fn test_parse_ack_and_error() {
    let ack: Incoming =
        serde_json::from_str(r#"{"type":"ack","id":"d41d8cd98f00b204","request_id":"r7"}"#)
            .unwrap();
    assert_eq!(
        ack,
        Incoming::Ack {
            id: Some("d41d8cd98f00b204".to_string()),
            request_id: Some("r7".to_string()),
        }
    );

    let bare_ack: Incoming = serde_json::from_str(r#"{"type":"ack"}"#).unwrap();
    assert_eq!(
        bare_ack,
        Incoming::Ack {
            id: None,
            request_id: None
        }
    );

    let error: Incoming =
        serde_json::from_str(r#"{"type":"error","message":"Document todos/x not found"}"#)
            .unwrap();
    match error {
        Incoming::Error {
            message,
            request_id,
        } => {
            assert!(message.contains("not found"));
            assert!(request_id.is_none());
        }
        other => panic!("Expected Error, got {:?}", other),
    }

    let pong: Incoming = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
    assert_eq!(pong, Incoming::Pong);
}

#[test]
fn test_http_add_body_is_a_document_write() {
    let body: Value = json!({
        "fields": {"task": "Buy milk", "completed": false},
        "serverTimestamps": ["createdAt"]
    });

    let write: DocumentWrite = serde_json::from_value(body).unwrap();
    let fields = write.resolve(42);
    assert_eq!(fields["createdAt"], json!(42));
    assert_eq!(fields["task"], json!("Buy milk"));
}

#[test]
fn test_document_without_timestamp_sorts_as_now() {
    let mut fields = Fields::new();
    fields.insert("task".to_string(), json!("Pending"));
    fields.insert("createdAt".to_string(), Value::Null);

    let snapshot = Snapshot {
        collection: "todos".to_string(),
        documents: vec![
            todo_doc("old", "Old", false, 1_000),
            Document::new("pending", fields),
        ],
        read_time: 2_000,
    };

    let now = Utc.timestamp_millis_opt(10_000).unwrap();
    let todos = todos_from_snapshot(&snapshot, now);
    assert_eq!(todos[0].id, "pending");
    assert_eq!(todos[0].created_at, now);
    assert!(!todos[0].completed);
}
