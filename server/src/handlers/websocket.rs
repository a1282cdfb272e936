//! WebSocket handler for live collection snapshots.
//!
//! Handles WebSocket connections, applies document requests, and keeps the
//! connection's subscriptions registered with the manager.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::websocket::{ClientMessage, ConnectionManager, ServerMessage};

use super::{handle_add, handle_delete, handle_subscribe, handle_update};

/// Handle an established WebSocket connection.
///
/// Registers the connection, forwards queued messages to the socket from a
/// spawned task, processes incoming messages until the client leaves, then
/// releases every subscription the connection held.
pub async fn handle_websocket_connection(
    socket: WebSocket,
    pool: PgPool,
    conn_manager: Arc<ConnectionManager>,
    client_id: Option<String>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_id = conn_manager.register(client_id, tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                for response in process_message(&text, &pool, &conn_manager, &conn_id).await {
                    conn_manager.send_to(&conn_id, response);
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
                conn_manager.send_to(
                    &conn_id,
                    ServerMessage::error("Binary messages not supported", None),
                );
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message and return the messages to send back.
///
/// A subscribe sends its ack and initial snapshot itself.
async fn process_message(
    text: &str,
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    conn_id: &str,
) -> Vec<ServerMessage> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return vec![ServerMessage::error(
                format!("Invalid message format: {}", e),
                None,
            )];
        }
    };

    match client_msg {
        ClientMessage::Subscribe {
            collection,
            request_id,
        } => match handle_subscribe(pool, conn_manager, conn_id, &collection, request_id.clone())
            .await
        {
            // Ack and snapshot were queued while the collection was locked
            Ok(()) => Vec::new(),
            Err(e) => vec![ServerMessage::error(e.client_message(), request_id)],
        },

        ClientMessage::Unsubscribe {
            collection,
            request_id,
        } => {
            conn_manager.unsubscribe(conn_id, &collection);
            vec![ServerMessage::ack(None, request_id)]
        }

        ClientMessage::Add {
            collection,
            document,
            request_id,
        } => match handle_add(pool, conn_manager, &collection, document).await {
            Ok(id) => vec![ServerMessage::ack(Some(id), request_id)],
            Err(e) => vec![ServerMessage::error(e.client_message(), request_id)],
        },

        ClientMessage::Update {
            collection,
            id,
            fields,
            request_id,
        } => match handle_update(pool, conn_manager, &collection, &id, fields).await {
            Ok(()) => vec![ServerMessage::ack(Some(id), request_id)],
            Err(e) => vec![ServerMessage::error(e.client_message(), request_id)],
        },

        ClientMessage::Delete {
            collection,
            id,
            request_id,
        } => match handle_delete(pool, conn_manager, &collection, &id).await {
            Ok(()) => vec![ServerMessage::ack(Some(id), request_id)],
            Err(e) => vec![ServerMessage::error(e.client_message(), request_id)],
        },

        ClientMessage::Ping => vec![ServerMessage::Pong],
    }
}
