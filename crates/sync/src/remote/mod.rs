//! Remote per-user document store.
//!
//! The authoritative copy of a signed-in user's cart and wishlist lives in a
//! hosted document store, one document per user and kind:
//!
//! ```text
//! users/{userId}/cart/active
//! users/{userId}/wishlist/active
//! ```
//!
//! The engine only needs three operations from it, captured by
//! [`RemoteStore`]: read a document, merge fields into a document, and follow
//! a document's changes. Two implementations ship with the crate:
//! - [`MemoryRemoteStore`] - in-process, used by tests and offline demos
//! - [`HttpRemoteStore`] - talks to `atelier-docstore` over HTTP + SSE

mod http;
mod memory;

use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::{Map, Value};

use atelier_core::{DocumentKind, UserId};

use crate::error::RemoteError;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// A JSON document body.
pub type Document = Map<String, Value>;

/// Live feed of a document's snapshots.
///
/// The current document, if any, is delivered first; every later change
/// follows. Dropping the subscription closes it.
pub struct Subscription {
    stream: Pin<Box<dyn Stream<Item = Document> + Send>>,
}

impl Subscription {
    /// Wrap a stream of snapshots.
    pub fn new(stream: impl Stream<Item = Document> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Wait for the next snapshot. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Document> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Operations the engine needs from the remote document store.
pub trait RemoteStore: Send + Sync + 'static {
    /// Read a document. `Ok(None)` when it does not exist yet.
    fn fetch(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> impl Future<Output = Result<Option<Document>, RemoteError>> + Send;

    /// Merge `fields` into a document, creating it if needed.
    ///
    /// Top-level fields present in `fields` replace the stored ones; other
    /// stored fields are preserved.
    fn merge_write(
        &self,
        user: &UserId,
        kind: DocumentKind,
        fields: Document,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Follow a document's changes.
    fn subscribe(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> impl Future<Output = Result<Subscription, RemoteError>> + Send;
}

/// Encode a value as a document body.
///
/// # Errors
///
/// Returns `RemoteError::Decode` if serialization fails and
/// `RemoteError::InvalidDocument` if the value is not a JSON object.
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, RemoteError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::InvalidDocument(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Decode a document body.
///
/// # Errors
///
/// Returns `RemoteError::Decode` if the document does not match `T`.
pub fn from_document<T: serde::de::DeserializeOwned>(document: Document) -> Result<T, RemoteError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
