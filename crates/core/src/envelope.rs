//! Shapes persisted to the per-user remote documents.
//!
//! ```text
//! users/{userId}/cart/active:     { items: LineItem[], itemCount, total, updatedAt }
//! users/{userId}/wishlist/active: { items: productId[], updatedAt }
//! ```
//!
//! `updatedAt` is informational only and never used to resolve conflicts.
//! `itemCount` and `total` are derived values written for readers of the
//! document; decoding recomputes them from the items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{CartState, LineItem};
use crate::types::ProductId;
use crate::wishlist::WishlistState;

/// Remote cart document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEnvelope {
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartEnvelope {
    /// Snapshot a cart for writing.
    #[must_use]
    pub fn from_state(state: &CartState, updated_at: DateTime<Utc>) -> Self {
        Self {
            items: state.items().to_vec(),
            item_count: state.item_count(),
            total: state.total(),
            updated_at: Some(updated_at),
        }
    }

    /// Decode into a cart, enforcing the cart invariants.
    #[must_use]
    pub fn into_state(self) -> CartState {
        CartState::from_items(self.items)
    }
}

/// Remote wishlist document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEnvelope {
    #[serde(default)]
    pub items: Vec<ProductId>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WishlistEnvelope {
    #[must_use]
    pub fn from_state(state: &WishlistState, updated_at: DateTime<Utc>) -> Self {
        Self {
            items: state.items().to_vec(),
            updated_at: Some(updated_at),
        }
    }

    #[must_use]
    pub fn into_state(self) -> WishlistState {
        WishlistState::from_ids(self.items)
    }
}
