//! HTTP route handlers for the docstore.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                  - Liveness
//! GET    /health/ready                            - Readiness (database)
//!
//! # Documents (bearer token required)
//! GET    /users/{user_id}/{kind}/active           - Read a document (404 if absent)
//! PATCH  /users/{user_id}/{kind}/active           - Merge top-level fields
//! DELETE /users/{user_id}/{kind}/active           - Delete a document
//! GET    /users/{user_id}/{kind}/active/events    - SSE feed of snapshots
//! ```
//!
//! `kind` is `cart` or `wishlist`.

pub mod documents;
pub mod events;
pub mod health;

use axum::{Router, routing::get};

use atelier_core::{DocumentKind, UserId};

use crate::error::AppError;
use crate::state::AppState;

/// Create the document routes router.
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{user_id}/{kind}/active",
            get(documents::show)
                .patch(documents::merge)
                .delete(documents::destroy),
        )
        .route("/{user_id}/{kind}/active/events", get(events::stream))
}

/// Create the health routes router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::live))
        .route("/health/ready", get(health::ready))
}

/// Validate the path segments naming a document.
fn document_key(user_id: String, kind: &str) -> Result<(UserId, DocumentKind), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user id must not be empty".to_string()));
    }
    let kind = kind
        .parse::<DocumentKind>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok((UserId::new(user_id), kind))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key() {
        let (user, kind) = document_key("u1".to_string(), "wishlist").unwrap();
        assert_eq!(user.as_str(), "u1");
        assert_eq!(kind, DocumentKind::Wishlist);

        assert!(matches!(
            document_key("u1".to_string(), "orders"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            document_key("  ".to_string(), "cart"),
            Err(AppError::BadRequest(_))
        ));
    }
}
