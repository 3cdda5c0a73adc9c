//! Document read, merge and delete.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::db::DocumentRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

use super::document_key;

/// `GET /users/{user_id}/{kind}/active`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(String, String)>,
) -> Result<Json<Map<String, Value>>> {
    let (user, kind) = document_key(user_id, &kind)?;

    DocumentRepository::new(state.pool())
        .get(&user, kind)
        .await?
        .map(|document| Json(document.data))
        .ok_or_else(|| AppError::NotFound(format!("{kind} for {user}")))
}

/// `PATCH /users/{user_id}/{kind}/active`
///
/// Merges the body's top-level fields into the stored document and publishes
/// the merged result to subscribers. Merges of one document are serialized so
/// the published order matches the commit order.
#[instrument(skip(state, fields), fields(field_count = fields.len()))]
pub async fn merge(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(String, String)>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>> {
    let (user, kind) = document_key(user_id, &kind)?;

    let _write = state.changes().write_lock(&user, kind).await;
    let document = DocumentRepository::new(state.pool())
        .merge(&user, kind, &fields)
        .await?;
    let subscribers = state.changes().publish(&user, kind, document.data.clone());
    info!(%user, %kind, subscribers, "Document merged");

    Ok(Json(document.data))
}

/// `DELETE /users/{user_id}/{kind}/active`
#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(String, String)>,
) -> Result<StatusCode> {
    let (user, kind) = document_key(user_id, &kind)?;

    if DocumentRepository::new(state.pool()).delete(&user, kind).await? {
        info!(%user, %kind, "Document deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("{kind} for {user}")))
    }
}
