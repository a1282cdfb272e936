//! Document collection routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use daybook_engine::{DocumentWrite, Fields, Snapshot};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_add, handle_delete, handle_snapshot, handle_update, AddResponse};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/collections/{collection}/documents",
            get(snapshot_handler).post(add_handler),
        )
        .route(
            "/collections/{collection}/documents/{id}",
            patch(update_handler).delete(delete_handler),
        )
}

/// GET /collections/{collection}/documents - Current snapshot.
async fn snapshot_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(collection): Path<String>,
) -> Result<Json<Snapshot>> {
    let snapshot = handle_snapshot(&state.pool, &collection).await?;
    Ok(Json(snapshot))
}

/// POST /collections/{collection}/documents - Add a document.
async fn add_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(collection): Path<String>,
    Json(write): Json<DocumentWrite>,
) -> Result<(StatusCode, Json<AddResponse>)> {
    let id = handle_add(&state.pool, &state.conn_manager, &collection, write).await?;
    Ok((StatusCode::CREATED, Json(AddResponse { id })))
}

/// PATCH /collections/{collection}/documents/{id} - Merge fields.
async fn update_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<StatusCode> {
    handle_update(&state.pool, &state.conn_manager, &collection, &id, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /collections/{collection}/documents/{id} - Delete a document.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    handle_delete(&state.pool, &state.conn_manager, &collection, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
