//! Atelier Sync - keeps a shopper's cart and wishlist in step across devices.
//!
//! Local state is usable while signed out and mirrored to a device cache.
//! Once the shopper signs in it is reconciled with their remote documents,
//! local changes are written back after a debounce window, and changes made
//! on other devices are adopted as they arrive.
//!
//! # Modules
//!
//! - [`engine`] - [`SyncEngine`], the state owner and its phase machine
//! - [`cache`] - Device-local write-through mirror
//! - [`remote`] - The remote document store interface and implementations
//! - [`gateway`] - Debounced remote writes
//! - [`subscriber`] - Remote change feed into local state
//! - [`merge`] - One-shot sign-in reconciliation
//! - [`scheduler`] - Cancelable delayed tasks (tokio or virtual clock)
//! - [`catalog`] - Stock lookups for the add and quantity paths
//! - [`config`] - Environment configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use atelier_core::{CartCommand, LineItem, UserId};
//! use atelier_sync::{FileStorage, MemoryRemoteStore, SyncEngine, TokioScheduler};
//! use rust_decimal::Decimal;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new(
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(FileStorage::new(".atelier")),
//!     Arc::new(TokioScheduler::new()),
//!     atelier_sync::config::DEFAULT_DEBOUNCE,
//! );
//!
//! engine.dispatch_cart(CartCommand::Add(LineItem::new(
//!     "P1",
//!     "Harbour at Dusk",
//!     Decimal::new(4500, 2),
//!     "print",
//! )));
//! engine.sign_in(UserId::new("u-42")).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod remote;
pub mod scheduler;
pub mod subscriber;

pub use cache::{DeviceCache, DeviceStorage, FileStorage, MemoryStorage};
pub use catalog::{CachedCatalog, Catalog, CatalogProduct, StaticCatalog};
pub use config::{RemoteConfig, SyncConfig};
pub use engine::{
    CartChange, Dispatch, IdentityEvent, Phase, ReplaceSource, SyncEngine, TransitionError,
};
pub use error::{CacheError, CatalogError, RemoteError, Result, SyncError};
pub use gateway::PersistenceGateway;
pub use merge::{MergeResolver, MergeResult};
pub use remote::{Document, HttpRemoteStore, MemoryRemoteStore, RemoteStore, Subscription};
pub use scheduler::{CancelToken, ManualScheduler, Scheduler, Task, TokioScheduler};
pub use subscriber::{RemoteApply, RemoteSink, RemoteSubscriber};
