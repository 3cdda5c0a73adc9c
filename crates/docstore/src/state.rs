//! Application state shared across handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use sqlx::PgPool;
use tokio::sync::broadcast;

use atelier_core::{DocumentKind, UserId};

use crate::config::DocstoreConfig;

const CHANGE_CHANNEL_CAPACITY: usize = 32;

type DocumentKey = (UserId, DocumentKind);

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DocstoreConfig,
    pool: PgPool,
    changes: ChangeHub,
}

impl AppState {
    #[must_use]
    pub fn new(config: DocstoreConfig, pool: PgPool) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                changes: ChangeHub::default(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DocstoreConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Fan-out of committed document changes to SSE subscribers.
    #[must_use]
    pub fn changes(&self) -> &ChangeHub {
        &self.inner.changes
    }
}

/// One broadcast channel and one write lock per active document.
///
/// Only changes committed through this process are published, so a
/// deployment with several docstore replicas needs sticky routing per user.
/// Writers hold the document's write lock from the upsert until the publish,
/// so subscribers see snapshots in commit order.
#[derive(Default)]
pub struct ChangeHub {
    channels: Mutex<HashMap<DocumentKey, Channel>>,
}

type Snapshot = Map<String, Value>;

struct Channel {
    sender: broadcast::Sender<Snapshot>,
    write: Arc<tokio::sync::Mutex<()>>,
}

impl Channel {
    fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
            write: Arc::default(),
        }
    }

    /// No subscriber is listening and no writer holds or awaits the lock.
    fn is_idle(&self) -> bool {
        self.sender.receiver_count() == 0 && Arc::strong_count(&self.write) == 1
    }
}

impl ChangeHub {
    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentKey, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow a document's changes.
    ///
    /// Channels left behind by disconnected subscribers are swept first.
    pub fn subscribe(&self, user: &UserId, kind: DocumentKind) -> broadcast::Receiver<Snapshot> {
        let mut channels = self.channels();
        channels.retain(|_, channel| !channel.is_idle());
        channels
            .entry((user.clone(), kind))
            .or_insert_with(Channel::new)
            .sender
            .subscribe()
    }

    /// Serialize writers of one document. Hold the guard across the commit
    /// and the matching [`publish`](Self::publish).
    pub async fn write_lock(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut channels = self.channels();
            let channel = channels
                .entry((user.clone(), kind))
                .or_insert_with(Channel::new);
            Arc::clone(&channel.write)
        };
        lock.lock_owned().await
    }

    /// Publish a committed snapshot. Returns the number of subscribers reached.
    pub fn publish(&self, user: &UserId, kind: DocumentKind, document: Snapshot) -> usize {
        let mut channels = self.channels();
        let key = (user.clone(), kind);
        let Some(channel) = channels.get(&key) else {
            return 0;
        };

        let reached = channel.sender.send(document).unwrap_or(0);
        if reached == 0 && Arc::strong_count(&channel.write) == 1 {
            channels.remove(&key);
        }
        reached
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers_of_that_document_only() {
        let hub = ChangeHub::default();
        let user = UserId::new("u1");
        let mut cart = hub.subscribe(&user, DocumentKind::Cart);
        let mut wishlist = hub.subscribe(&user, DocumentKind::Wishlist);

        let reached = hub.publish(&user, DocumentKind::Cart, doc(json!({"items": []})));

        assert_eq!(reached, 1);
        assert!(cart.recv().await.unwrap().contains_key("items"));
        assert!(wishlist.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_prunes_channel() {
        let hub = ChangeHub::default();
        let user = UserId::new("u1");
        drop(hub.subscribe(&user, DocumentKind::Cart));

        assert_eq!(hub.publish(&user, DocumentKind::Cart, Map::new()), 0);
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn test_subscribe_sweeps_abandoned_channels() {
        let hub = ChangeHub::default();
        drop(hub.subscribe(&UserId::new("u1"), DocumentKind::Cart));
        drop(hub.subscribe(&UserId::new("u2"), DocumentKind::Wishlist));
        let _live = hub.subscribe(&UserId::new("u3"), DocumentKind::Cart);

        let channels = hub.channels();
        assert_eq!(channels.len(), 1);
        assert!(channels.contains_key(&(UserId::new("u3"), DocumentKind::Cart)));
    }

    #[tokio::test]
    async fn test_concurrent_writes_publish_in_lock_order() {
        let hub = Arc::new(ChangeHub::default());
        let user = UserId::new("u1");
        let mut events = hub.subscribe(&user, DocumentKind::Cart);

        let first = hub.write_lock(&user, DocumentKind::Cart).await;
        let second = tokio::spawn({
            let hub = Arc::clone(&hub);
            let user = user.clone();
            async move {
                let _write = hub.write_lock(&user, DocumentKind::Cart).await;
                hub.publish(&user, DocumentKind::Cart, doc(json!({"items": ["b"]})));
            }
        });

        // Let the second writer reach the lock before the first publishes.
        tokio::task::yield_now().await;
        hub.publish(&user, DocumentKind::Cart, doc(json!({"items": ["a"]})));
        drop(first);
        second.await.unwrap();

        assert_eq!(events.recv().await.unwrap()["items"], json!(["a"]));
        assert_eq!(events.recv().await.unwrap()["items"], json!(["b"]));
    }

    #[tokio::test]
    async fn test_write_locks_are_per_document() {
        let hub = ChangeHub::default();
        let user = UserId::new("u1");
        let _cart = hub.write_lock(&user, DocumentKind::Cart).await;

        let wishlist = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            hub.write_lock(&user, DocumentKind::Wishlist),
        )
        .await;
        assert!(wishlist.is_ok());
    }

    #[tokio::test]
    async fn test_publish_keeps_channel_while_writer_holds_lock() {
        let hub = ChangeHub::default();
        let user = UserId::new("u1");
        let write = hub.write_lock(&user, DocumentKind::Cart).await;

        assert_eq!(hub.publish(&user, DocumentKind::Cart, Map::new()), 0);
        assert_eq!(hub.channels().len(), 1);

        drop(write);
        assert_eq!(hub.publish(&user, DocumentKind::Cart, Map::new()), 0);
        assert!(hub.channels().is_empty());
    }
}
