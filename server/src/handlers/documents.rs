//! Document mutations and snapshot reads.
//!
//! Every successful mutation pushes a fresh snapshot to the collection's
//! subscribers. Snapshot reads for one collection never overlap.

use daybook_engine::{DocumentWrite, Fields, Snapshot, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db;
use crate::error::{AppError, Result};
use crate::websocket::{ConnectionManager, ServerMessage};

/// Longest accepted collection name.
pub const MAX_COLLECTION_LEN: usize = 64;

/// Response to a document add.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddResponse {
    pub id: String,
}

/// Current server time in epoch milliseconds.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Reject collection names that are empty, too long, or not `[A-Za-z0-9_-]`.
pub fn validate_collection(collection: &str) -> Result<()> {
    if collection.is_empty() {
        return Err(AppError::BadRequest("Collection name is empty".to_string()));
    }
    if collection.len() > MAX_COLLECTION_LEN {
        return Err(AppError::BadRequest(format!(
            "Collection name longer than {} characters",
            MAX_COLLECTION_LEN
        )));
    }
    if !collection
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::BadRequest(format!(
            "Invalid collection name: {}",
            collection
        )));
    }
    Ok(())
}

fn validate_doc_id(doc_id: &str) -> Result<()> {
    if doc_id.trim().is_empty() {
        return Err(AppError::BadRequest("Document id is empty".to_string()));
    }
    Ok(())
}

/// Read the full contents of a collection.
pub async fn handle_snapshot(pool: &PgPool, collection: &str) -> Result<Snapshot> {
    validate_collection(collection)?;
    Ok(db::list_documents(pool, collection, now_millis()).await?)
}

/// Store a new document under a generated id and return the id.
pub async fn handle_add(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    collection: &str,
    write: DocumentWrite,
) -> Result<String> {
    validate_collection(collection)?;

    let now = now_millis();
    let doc_id = uuid::Uuid::new_v4().simple().to_string();
    let fields = write.resolve(now);

    db::insert_document(pool, collection, &doc_id, &fields, now).await?;
    tracing::info!(collection = %collection, id = %doc_id, "Document added");

    publish(pool, conn_manager, collection).await;
    Ok(doc_id)
}

/// Merge fields into an existing document.
pub async fn handle_update(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    collection: &str,
    doc_id: &str,
    fields: Fields,
) -> Result<()> {
    validate_collection(collection)?;
    validate_doc_id(doc_id)?;

    if !db::update_fields(pool, collection, doc_id, &fields, now_millis()).await? {
        return Err(AppError::NotFound(format!(
            "Document {}/{} not found",
            collection, doc_id
        )));
    }
    tracing::info!(collection = %collection, id = %doc_id, fields = fields.len(), "Document updated");

    publish(pool, conn_manager, collection).await;
    Ok(())
}

/// Delete a document. Deleting a missing document succeeds.
pub async fn handle_delete(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    collection: &str,
    doc_id: &str,
) -> Result<()> {
    validate_collection(collection)?;
    validate_doc_id(doc_id)?;

    let removed = db::delete_document(pool, collection, doc_id).await?;
    tracing::info!(collection = %collection, id = %doc_id, removed, "Document deleted");

    if removed {
        publish(pool, conn_manager, collection).await;
    }
    Ok(())
}

/// Subscribe a connection and send it an ack followed by the current
/// snapshot.
///
/// Runs under the collection lock so the initial snapshot cannot overtake a
/// newer broadcast.
pub async fn handle_subscribe(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    conn_id: &str,
    collection: &str,
    request_id: Option<String>,
) -> Result<()> {
    validate_collection(collection)?;

    let _guard = conn_manager.lock_collection(collection).await;
    conn_manager.subscribe(conn_id, collection);

    match db::list_documents(pool, collection, conn_manager.next_read_time()).await {
        Ok(snapshot) => {
            conn_manager.send_to(conn_id, ServerMessage::ack(None, request_id));
            conn_manager.deliver_snapshot(conn_id, snapshot);
            tracing::debug!(
                collection = %collection,
                subscribers = conn_manager.subscriber_count(collection),
                "Client subscribed"
            );
            Ok(())
        }
        Err(e) => {
            conn_manager.unsubscribe(conn_id, collection);
            Err(e.into())
        }
    }
}

/// Push the current snapshot to every subscriber of `collection`.
///
/// The read and the broadcast happen under the collection lock, so
/// subscribers receive snapshots in the order they were read. The mutation
/// has already committed, so a failed read is only logged.
async fn publish(pool: &PgPool, conn_manager: &ConnectionManager, collection: &str) {
    if !conn_manager.has_subscribers(collection) {
        return;
    }

    let _guard = conn_manager.lock_collection(collection).await;
    match db::list_documents(pool, collection, conn_manager.next_read_time()).await {
        Ok(snapshot) => {
            conn_manager.broadcast_snapshot(snapshot);
        }
        Err(e) => {
            tracing::warn!(collection = %collection, "Failed to read snapshot for subscribers: {}", e);
        }
    }
}
