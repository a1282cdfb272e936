//! WebSocket upgrade route.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::handlers::handle_websocket_connection;
use crate::AppState;

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Identifier the client uses across reconnects
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Create WebSocket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws - Upgrade to a snapshot subscription socket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<WsQuery>,
) -> Response {
    tracing::debug!(anonymous = auth.is_anonymous(), "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, state.pool, state.conn_manager, query.client_id)
    })
}
