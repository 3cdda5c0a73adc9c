//! Integration tests for Atelier.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process scenarios (no services needed)
//! cargo test -p atelier-integration-tests
//!
//! # Including the docstore round trips
//! cargo run -p atelier-cli -- migrate
//! cargo run -p atelier-docstore &
//! cargo test -p atelier-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `cart_scenarios` - Guest cart rules, stock checks and the device cache
//! - `sign_in_merge` - Reconciliation of guest and remote state at sign-in
//! - `remote_updates` - Debounced writes and changes from other devices
//! - `docstore_http` - The HTTP remote store against a running docstore
//!
//! This crate holds the shared fixtures: a [`World`] is one remote store
//! that any number of [`Device`]s can sign in against.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use atelier_core::{
    CartEnvelope, CartState, Category, DocumentKind, LineItem, ProductId, SyncDocument, UserId,
    WishlistEnvelope, WishlistState,
};
use atelier_sync::remote::{from_document, to_document};
use atelier_sync::{
    CatalogProduct, DeviceStorage, ManualScheduler, MemoryRemoteStore, MemoryStorage,
    StaticCatalog, SyncEngine,
};

/// Debounce window used by every test device.
pub const WINDOW: Duration = Duration::from_millis(1500);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// A shared remote document store.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub remote: MemoryRemoteStore,
}

/// One client: an engine with its own clock and device storage.
pub struct Device {
    pub engine: SyncEngine<MemoryRemoteStore>,
    pub scheduler: ManualScheduler,
    pub storage: Arc<dyn DeviceStorage>,
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh device with in-memory storage.
    #[must_use]
    pub fn device(&self) -> Device {
        self.device_with_storage(Arc::new(MemoryStorage::new()))
    }

    /// A device over existing storage, as after an app restart.
    #[must_use]
    pub fn device_with_storage(&self, storage: Arc<dyn DeviceStorage>) -> Device {
        let scheduler = ManualScheduler::new();
        let engine = SyncEngine::new(
            Arc::new(self.remote.clone()),
            Arc::clone(&storage),
            Arc::new(scheduler.clone()),
            WINDOW,
        );
        Device {
            engine,
            scheduler,
            storage,
        }
    }

    /// Store a cart for `user` as another device would.
    ///
    /// # Panics
    ///
    /// Panics if the cart cannot be encoded.
    pub fn seed_cart(&self, user: &UserId, cart: &CartState) {
        let fields = to_document(&cart.to_envelope(Utc::now())).expect("encode cart");
        self.remote.write_from_elsewhere(user, DocumentKind::Cart, fields);
    }

    /// Store a wishlist for `user` as another device would.
    ///
    /// # Panics
    ///
    /// Panics if the wishlist cannot be encoded.
    pub fn seed_wishlist(&self, user: &UserId, wishlist: &WishlistState) {
        let fields = to_document(&wishlist.to_envelope(Utc::now())).expect("encode wishlist");
        self.remote
            .write_from_elsewhere(user, DocumentKind::Wishlist, fields);
    }

    /// The remote cart of `user`, decoded.
    ///
    /// # Panics
    ///
    /// Panics if the stored document is not a cart.
    #[must_use]
    pub fn remote_cart(&self, user: &UserId) -> Option<CartState> {
        self.remote.document(user, DocumentKind::Cart).map(|doc| {
            from_document::<CartEnvelope>(doc)
                .expect("decode cart")
                .into_state()
        })
    }

    /// The remote wishlist of `user`, decoded.
    ///
    /// # Panics
    ///
    /// Panics if the stored document is not a wishlist.
    #[must_use]
    pub fn remote_wishlist(&self, user: &UserId) -> Option<WishlistState> {
        self.remote.document(user, DocumentKind::Wishlist).map(|doc| {
            from_document::<WishlistEnvelope>(doc)
                .expect("decode wishlist")
                .into_state()
        })
    }
}

/// Products used across scenarios.
///
/// | id | category | stock |
/// |----|----------|-------|
/// | P1 | print | 10 |
/// | P2 | painting | 1 |
/// | P3 | poster | 50 |
/// | P4 | sculpture | 0 |
#[must_use]
pub fn gallery_catalog() -> StaticCatalog {
    StaticCatalog::from_products([
        product("P1", "Harbour at Dusk", "print", 10),
        product("P2", "Blue Study No. 4", "painting", 1),
        product("P3", "Salt Marsh", "poster", 50),
        product("P4", "Figure in Bronze", "sculpture", 0),
    ])
}

fn product(id: &str, title: &str, category: &str, stock: u32) -> CatalogProduct {
    CatalogProduct {
        id: ProductId::new(id),
        title: title.to_string(),
        image: None,
        unit_price: Decimal::new(4500, 2),
        category: Category::from(category),
        stock,
    }
}

/// The cart line for a catalog product.
///
/// # Panics
///
/// Panics if `id` is not in [`gallery_catalog`].
#[must_use]
pub fn line(id: &str) -> LineItem {
    gallery_catalog()
        .products()
        .find(|p| p.id.as_str() == id)
        .map(CatalogProduct::to_line_item)
        .expect("product in gallery catalog")
}

/// A cart built from `(id, quantity)` pairs of catalog products.
#[must_use]
pub fn cart_of(lines: &[(&str, u32)]) -> CartState {
    CartState::from_items(lines.iter().map(|&(id, quantity)| LineItem {
        quantity,
        ..line(id)
    }))
}

/// `(product id, quantity)` pairs, sorted by id.
#[must_use]
pub fn quantities(cart: &CartState) -> Vec<(String, u32)> {
    let mut lines: Vec<(String, u32)> = cart
        .items()
        .iter()
        .map(|item| (item.product_id.to_string(), item.quantity))
        .collect();
    lines.sort();
    lines
}

/// Wishlist ids, sorted.
#[must_use]
pub fn wishlist_ids(wishlist: &WishlistState) -> Vec<String> {
    let mut ids: Vec<String> = wishlist.items().iter().map(ToString::to_string).collect();
    ids.sort();
    ids
}

/// Poll `check` until it holds, yielding to spawned tasks in between.
///
/// # Panics
///
/// Panics if `check` still fails after two seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Give spawned tasks a chance to run without waiting on a condition.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
