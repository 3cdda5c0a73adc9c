//! Catalog collaborator and the call-site stock checks.
//!
//! The cart reducer is catalog-agnostic. Live stock and category come from
//! the catalog service and are consulted *before* a command is issued; see
//! [`SyncEngine::add_to_cart`](crate::SyncEngine::add_to_cart) and
//! [`SyncEngine::set_cart_quantity`](crate::SyncEngine::set_cart_quantity).
//!
//! Stock lookups are cached with `moka` (1 minute TTL) so a burst of +/- taps
//! does not hit the catalog each time.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use atelier_core::{Category, LineItem, ProductId, is_unique_category};

use crate::error::CatalogError;

/// What the catalog knows about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub category: Category,
    /// Units available for sale.
    pub stock: u32,
}

impl CatalogProduct {
    #[must_use]
    pub fn is_unique(&self) -> bool {
        is_unique_category(&self.category)
    }

    /// Highest quantity a cart line may hold for this product.
    #[must_use]
    pub fn max_quantity(&self) -> u32 {
        if self.is_unique() {
            self.stock.min(1)
        } else {
            self.stock
        }
    }

    /// Build the cart line the storefront would add for this product.
    #[must_use]
    pub fn to_line_item(&self) -> LineItem {
        let item = LineItem::new(
            self.id.clone(),
            self.title.clone(),
            self.unit_price,
            self.category.clone(),
        );
        match &self.image {
            Some(url) => item.with_image(url.clone()),
            None => item,
        }
    }
}

/// Read access to product stock and category.
pub trait Catalog: Send + Sync {
    /// Look up a product.
    fn product(
        &self,
        id: &ProductId,
    ) -> impl Future<Output = Result<CatalogProduct, CatalogError>> + Send;
}

/// A fixed set of products, loaded from memory or a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: HashMap<ProductId, CatalogProduct>,
}

impl StaticCatalog {
    #[must_use]
    pub fn from_products(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Parse a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` if the JSON is not a product array.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let products: Vec<CatalogProduct> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(Self::from_products(products))
    }

    /// Load a JSON array of products from a file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Unavailable` if the file cannot be read and
    /// `CatalogError::Parse` if it is malformed.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// All products, in no particular order.
    pub fn products(&self) -> impl Iterator<Item = &CatalogProduct> {
        self.products.values()
    }
}

impl Catalog for StaticCatalog {
    async fn product(&self, id: &ProductId) -> Result<CatalogProduct, CatalogError> {
        self.products
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}

/// Caches another catalog's lookups.
#[derive(Clone)]
pub struct CachedCatalog<C> {
    inner: Arc<C>,
    cache: Cache<ProductId, CatalogProduct>,
}

impl<C: Catalog> CachedCatalog<C> {
    /// Wrap `inner` with a 1 minute TTL cache.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_ttl(inner, Duration::from_secs(60))
    }

    #[must_use]
    pub fn with_ttl(inner: C, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(inner),
            cache,
        }
    }

    /// Forget a cached product, e.g. after a stock change notification.
    pub async fn invalidate(&self, id: &ProductId) {
        self.cache.invalidate(id).await;
    }
}

impl<C: Catalog> Catalog for CachedCatalog<C> {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: &ProductId) -> Result<CatalogProduct, CatalogError> {
        if let Some(product) = self.cache.get(id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product = self.inner.product(id).await?;
        self.cache.insert(id.clone(), product.clone()).await;
        Ok(product)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn product(id: &str, category: &str, stock: u32) -> CatalogProduct {
        CatalogProduct {
            id: ProductId::new(id),
            title: format!("Work {id}"),
            image: None,
            unit_price: Decimal::new(10_000, 2),
            category: Category::from(category),
            stock,
        }
    }

    struct CountingCatalog {
        inner: StaticCatalog,
        lookups: AtomicUsize,
    }

    impl Catalog for CountingCatalog {
        async fn product(&self, id: &ProductId) -> Result<CatalogProduct, CatalogError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.product(id).await
        }
    }

    #[test]
    fn test_max_quantity() {
        assert_eq!(product("a", "print", 5).max_quantity(), 5);
        assert_eq!(product("b", "original", 1).max_quantity(), 1);
        assert_eq!(product("c", "original", 0).max_quantity(), 0);
    }

    #[test]
    fn test_from_json() {
        let catalog = StaticCatalog::from_json(
            r#"[{"id":"P1","title":"Dune","unitPrice":"45.00","category":"print","stock":5}]"#,
        )
        .unwrap();
        assert_eq!(catalog.products().count(), 1);
        assert!(StaticCatalog::from_json("{}").is_err());
    }

    #[tokio::test]
    async fn test_static_catalog_not_found() {
        let catalog = StaticCatalog::default();
        let err = catalog.product(&ProductId::new("nope")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cached_catalog_hits_inner_once() {
        let counting = CountingCatalog {
            inner: StaticCatalog::from_products([product("P1", "print", 5)]),
            lookups: AtomicUsize::new(0),
        };
        let cached = CachedCatalog::new(counting);
        let id = ProductId::new("P1");

        assert_eq!(cached.product(&id).await.unwrap().stock, 5);
        assert_eq!(cached.product(&id).await.unwrap().stock, 5);
        assert_eq!(cached.inner.lookups.load(Ordering::SeqCst), 1);

        cached.invalidate(&id).await;
        cached.product(&id).await.unwrap();
        assert_eq!(cached.inner.lookups.load(Ordering::SeqCst), 2);
    }
}
