//! Server-sent change feed of one document.
//!
//! The current document (if any) is sent first as a `snapshot` event, then
//! every merge committed through this process. Each event carries the whole
//! document, so a subscriber that lags behind only misses intermediate states.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::Stream;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, instrument, warn};

use crate::db::DocumentRepository;
use crate::error::Result;
use crate::state::AppState;

use super::document_key;

/// `GET /users/{user_id}/{kind}/active/events`
#[instrument(skip(state))]
pub async fn stream(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let (user, kind) = document_key(user_id, &kind)?;

    // Subscribe before reading so a merge landing in between is not missed.
    let mut changes = state.changes().subscribe(&user, kind);
    let current = DocumentRepository::new(state.pool()).get(&user, kind).await?;
    debug!(%user, %kind, exists = current.is_some(), "Change feed opened");

    let events = async_stream::stream! {
        if let Some(event) = current.and_then(|document| snapshot_event(&document.data)) {
            yield Ok(event);
        }
        loop {
            match changes.recv().await {
                Ok(document) => {
                    if let Some(event) = snapshot_event(&document) {
                        yield Ok(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%user, %kind, skipped, "Change feed subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn snapshot_event(document: &Map<String, Value>) -> Option<Event> {
    match serde_json::to_string(document) {
        Ok(json) => Some(Event::default().event("snapshot").data(json)),
        Err(e) => {
            warn!(error = %e, "Failed to encode snapshot event");
            None
        }
    }
}
