//! In-process remote store.
//!
//! Behaves like the hosted store from the engine's point of view: documents
//! are merged field by field, and every write is fanned out to subscribers.
//! Writes and reads can be made to fail on demand so error paths are testable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use atelier_core::{DocumentKind, UserId};

use super::{Document, RemoteStore, Subscription};
use crate::error::RemoteError;

const CHANNEL_CAPACITY: usize = 64;

type DocumentKey = (UserId, DocumentKind);

/// In-memory [`RemoteStore`], cheaply cloneable.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: Mutex<HashMap<DocumentKey, Document>>,
    channels: Mutex<HashMap<DocumentKey, broadcast::Sender<Document>>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryInner {
    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentKey, Document>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, key: &DocumentKey) -> broadcast::Sender<Document> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a document.
    #[must_use]
    pub fn document(&self, user: &UserId, kind: DocumentKind) -> Option<Document> {
        self.inner.documents().get(&(user.clone(), kind)).cloned()
    }

    /// Number of successful `merge_write` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent reads fail with `RemoteError::Unavailable`.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `RemoteError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Merge fields into a document as another device would, notifying
    /// subscribers. Not counted in [`Self::write_count`].
    pub fn write_from_elsewhere(&self, user: &UserId, kind: DocumentKind, fields: Document) {
        self.apply_merge(&(user.clone(), kind), fields);
    }

    fn apply_merge(&self, key: &DocumentKey, fields: Document) {
        // Publish while still holding the document lock so subscribers see
        // snapshots in write order.
        let mut documents = self.inner.documents();
        let document = documents.entry(key.clone()).or_default();
        document.extend(fields);
        let snapshot = document.clone();
        // No receivers is fine: nobody is subscribed to this document.
        let _ = self.inner.sender(key).send(snapshot);
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn fetch(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> Result<Option<Document>, RemoteError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.document(user, kind))
    }

    async fn merge_write(
        &self,
        user: &UserId,
        kind: DocumentKind,
        fields: Document,
    ) -> Result<(), RemoteError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("writes disabled".to_string()));
        }
        self.apply_merge(&(user.clone(), kind), fields);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        debug!(%user, %kind, "Merged document");
        Ok(())
    }

    async fn subscribe(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> Result<Subscription, RemoteError> {
        let key = (user.clone(), kind);
        let (current, mut receiver) = {
            let documents = self.inner.documents();
            (documents.get(&key).cloned(), self.inner.sender(&key).subscribe())
        };

        Ok(Subscription::new(async_stream::stream! {
            if let Some(document) = current {
                yield document;
            }
            loop {
                match receiver.recv().await {
                    Ok(document) => yield document,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[tokio::test]
    async fn test_merge_write_preserves_other_fields() {
        let store = MemoryRemoteStore::new();
        let user = UserId::new("u1");

        store
            .merge_write(&user, DocumentKind::Cart, fields(json!({"items": [], "note": "keep"})))
            .await
            .unwrap();
        store
            .merge_write(&user, DocumentKind::Cart, fields(json!({"items": [1]})))
            .await
            .unwrap();

        let document = store.fetch(&user, DocumentKind::Cart).await.unwrap().unwrap();
        assert_eq!(document["note"], "keep");
        assert_eq!(document["items"], json!([1]));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_then_changes() {
        let store = MemoryRemoteStore::new();
        let user = UserId::new("u1");
        store.write_from_elsewhere(&user, DocumentKind::Wishlist, fields(json!({"items": ["a"]})));

        let mut subscription = store.subscribe(&user, DocumentKind::Wishlist).await.unwrap();
        assert_eq!(subscription.next().await.unwrap()["items"], json!(["a"]));

        store.write_from_elsewhere(&user, DocumentKind::Wishlist, fields(json!({"items": ["b"]})));
        assert_eq!(subscription.next().await.unwrap()["items"], json!(["b"]));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryRemoteStore::new();
        let user = UserId::new("u1");
        store.fail_writes(true);
        store.fail_reads(true);

        assert!(
            store
                .merge_write(&user, DocumentKind::Cart, Document::new())
                .await
                .is_err()
        );
        assert!(store.fetch(&user, DocumentKind::Cart).await.is_err());
        assert_eq!(store.write_count(), 0);
    }
}
