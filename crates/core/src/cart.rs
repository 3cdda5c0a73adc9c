//! Cart line items and the cart reducer.
//!
//! All cart mutation goes through [`CartState::apply`]. The reducer is pure
//! and total: it never panics, performs no I/O and knows nothing about live
//! stock levels (the call site checks those against the catalog).
//!
//! # Invariants
//!
//! - No two line items share a product id.
//! - Every quantity is at least 1.
//! - Items in a unique category always have a quantity of exactly 1.
//!
//! States decoded from untrusted input (device cache, remote snapshots) are
//! normalized on the way in so the invariants hold for them too.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Category, ProductId, is_unique_category, line_total};

/// One product entry in the cart.
///
/// Carries the display fields needed to render the cart offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub category: Category,
    pub quantity: u32,
}

impl LineItem {
    /// Create a line item with a quantity of 1.
    #[must_use]
    pub fn new(
        product_id: impl Into<ProductId>,
        title: impl Into<String>,
        unit_price: Decimal,
        category: impl Into<Category>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            title: title.into(),
            image: None,
            unit_price,
            category: category.into(),
            quantity: 1,
        }
    }

    /// Attach an image URL.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    /// Whether this item is a one-of-a-kind work.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        is_unique_category(&self.category)
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }

    /// Apply the quantity invariants to a requested quantity.
    fn clamp_quantity(&self, requested: u32) -> u32 {
        if self.is_unique() { 1 } else { requested.max(1) }
    }
}

/// Commands accepted by the cart reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCommand {
    /// Add one unit of a product, appending it if absent.
    Add(LineItem),
    /// Remove a product entirely.
    Remove(ProductId),
    /// Set the quantity of a product (floored at 1).
    SetQuantity(ProductId, u32),
    /// Empty the cart.
    Clear,
    /// Swap in a whole new state. Reserved for hydration, merge and remote sync.
    Replace(CartState),
}

/// An ordered collection of line items keyed by product id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "CartStateRepr")]
pub struct CartState {
    items: Vec<LineItem>,
}

/// Wire representation, normalized through [`CartState::from_items`].
#[derive(Deserialize)]
struct CartStateRepr {
    #[serde(default)]
    items: Vec<LineItem>,
}

impl From<CartStateRepr> for CartState {
    fn from(repr: CartStateRepr) -> Self {
        Self::from_items(repr.items)
    }
}

impl CartState {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from arbitrary items, enforcing the invariants.
    ///
    /// Duplicate ids are folded into the first occurrence by summing their
    /// quantities, then every quantity is clamped.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut folded: Vec<LineItem> = Vec::new();
        for item in items {
            match folded.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => folded.push(item),
            }
        }
        for item in &mut folded {
            item.quantity = item.clamp_quantity(item.quantity);
        }
        Self { items: folded }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Look up a line item by product id.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|i| &i.product_id == id)
    }

    /// Whether the cart holds a product.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Apply a command, returning the next state.
    #[must_use]
    pub fn apply(mut self, command: CartCommand) -> Self {
        match command {
            CartCommand::Add(item) => {
                match self
                    .items
                    .iter_mut()
                    .find(|i| i.product_id == item.product_id)
                {
                    Some(existing) => {
                        if !existing.is_unique() {
                            existing.quantity = existing.quantity.saturating_add(1);
                        }
                    }
                    None => self.items.push(LineItem { quantity: 1, ..item }),
                }
                self
            }
            CartCommand::Remove(id) => {
                self.items.retain(|i| i.product_id != id);
                self
            }
            CartCommand::SetQuantity(id, quantity) => {
                if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == id) {
                    existing.quantity = existing.clamp_quantity(quantity);
                }
                self
            }
            CartCommand::Clear => Self::new(),
            CartCommand::Replace(state) => state,
        }
    }

    /// Reconcile a guest cart with the cart stored remotely for an account.
    ///
    /// Remote items come first in their stored order, followed by guest-only
    /// items. For ids present on both sides the guest's display fields win and
    /// the quantity is the larger of the two; unique items are forced to 1.
    #[must_use]
    pub fn merge(guest: &Self, remote: &Self) -> Self {
        let mut merged: Vec<LineItem> = remote
            .items
            .iter()
            .map(|remote_item| match guest.get(&remote_item.product_id) {
                Some(guest_item) => LineItem {
                    quantity: guest_item.quantity.max(remote_item.quantity),
                    ..guest_item.clone()
                },
                None => remote_item.clone(),
            })
            .collect();

        merged.extend(
            guest
                .items
                .iter()
                .filter(|i| !remote.contains(&i.product_id))
                .cloned(),
        );

        Self::from_items(merged)
    }
}

/// Reducer entry point: `(CartState, CartCommand) -> CartState`.
#[must_use]
pub fn apply(state: CartState, command: CartCommand) -> CartState {
    state.apply(command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn print(id: &str) -> LineItem {
        LineItem::new(id, format!("Print {id}"), Decimal::new(4500, 2), "print")
    }

    fn original(id: &str) -> LineItem {
        LineItem::new(id, format!("Original {id}"), Decimal::new(120_000, 2), "original")
    }

    fn with_qty(item: LineItem, quantity: u32) -> LineItem {
        LineItem { quantity, ..item }
    }

    #[test]
    fn test_add_twice_stacks_quantity() {
        let state = CartState::new()
            .apply(CartCommand::Add(print("P1")))
            .apply(CartCommand::Add(print("P1")));

        assert_eq!(state.len(), 1);
        assert_eq!(state.items()[0].quantity, 2);
    }

    #[test]
    fn test_add_unique_twice_is_noop() {
        let state = CartState::new()
            .apply(CartCommand::Add(original("P2")))
            .apply(CartCommand::Add(original("P2")));

        assert_eq!(state.len(), 1);
        assert_eq!(state.items()[0].quantity, 1);
    }

    #[test]
    fn test_add_ignores_incoming_quantity() {
        let state = CartState::new().apply(CartCommand::Add(with_qty(print("P1"), 7)));
        assert_eq!(state.items()[0].quantity, 1);
    }

    #[test]
    fn test_set_quantity_floors_at_one() {
        let state = CartState::new()
            .apply(CartCommand::Add(print("P1")))
            .apply(CartCommand::SetQuantity(ProductId::new("P1"), 0));

        assert_eq!(state.items()[0].quantity, 1);
    }

    #[test]
    fn test_set_quantity_pins_unique_items() {
        let state = CartState::new()
            .apply(CartCommand::Add(original("P2")))
            .apply(CartCommand::SetQuantity(ProductId::new("P2"), 4));

        assert_eq!(state.items()[0].quantity, 1);
    }

    #[test]
    fn test_set_quantity_unknown_id_is_noop() {
        let before = CartState::new().apply(CartCommand::Add(print("P1")));
        let after = before
            .clone()
            .apply(CartCommand::SetQuantity(ProductId::new("missing"), 3));
        assert_eq!(before, after);
    }

    #[test]
    fn test_remove_and_clear() {
        let state = CartState::new()
            .apply(CartCommand::Add(print("P1")))
            .apply(CartCommand::Add(print("P3")))
            .apply(CartCommand::Remove(ProductId::new("P1")));

        assert_eq!(state.len(), 1);
        assert!(state.contains(&ProductId::new("P3")));
        assert!(state.apply(CartCommand::Clear).is_empty());
    }

    #[test]
    fn test_replace_returns_state_verbatim() {
        let replacement = CartState::from_items([with_qty(print("P9"), 3)]);
        let state = CartState::new()
            .apply(CartCommand::Add(print("P1")))
            .apply(CartCommand::Replace(replacement.clone()));
        assert_eq!(state, replacement);
    }

    #[test]
    fn test_command_sequences_never_duplicate_or_stack_unique() {
        let ids = ["A", "B", "C"];
        let mut state = CartState::new();
        for step in 0u32..60 {
            let id = ids[(step % 3) as usize];
            let item = if id == "B" { original(id) } else { print(id) };
            let command = match step % 5 {
                0 | 1 => CartCommand::Add(item),
                2 => CartCommand::SetQuantity(ProductId::new(id), step % 4),
                3 => CartCommand::SetQuantity(ProductId::new(id), step),
                _ => CartCommand::Remove(ProductId::new(id)),
            };
            state = state.apply(command);

            let mut seen: Vec<&ProductId> = state.items().iter().map(|i| &i.product_id).collect();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), state.len());
            for item in state.items() {
                assert!(item.quantity >= 1);
                if item.is_unique() {
                    assert_eq!(item.quantity, 1);
                }
            }
        }
    }

    #[test]
    fn test_totals() {
        let state = CartState::from_items([with_qty(print("P1"), 2), original("P2")]);
        assert_eq!(state.item_count(), 3);
        assert_eq!(state.total(), Decimal::new(129_000, 2));
    }

    #[test]
    fn test_from_items_folds_duplicates() {
        let state = CartState::from_items([
            with_qty(print("P1"), 2),
            with_qty(print("P1"), 3),
            with_qty(original("P2"), 5),
            with_qty(print("P4"), 0),
        ]);

        assert_eq!(state.len(), 3);
        assert_eq!(state.get(&ProductId::new("P1")).unwrap().quantity, 5);
        assert_eq!(state.get(&ProductId::new("P2")).unwrap().quantity, 1);
        assert_eq!(state.get(&ProductId::new("P4")).unwrap().quantity, 1);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let json = r#"{"items":[
            {"productId":"P1","title":"a","unitPrice":"10","category":"print","quantity":1},
            {"productId":"P1","title":"a","unitPrice":"10","category":"print","quantity":2},
            {"productId":"P2","title":"b","unitPrice":"10","category":"painting","quantity":3}
        ]}"#;
        let state: CartState = serde_json::from_str(json).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.items()[0].quantity, 3);
        assert_eq!(state.items()[1].quantity, 1);
    }

    #[test]
    fn test_merge_takes_max_and_keeps_both_sides() {
        let guest = CartState::from_items([with_qty(print("P1"), 2)]);
        let remote = CartState::from_items([print("P1"), print("P3")]);

        let merged = CartState::merge(&guest, &remote);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.items()[0].product_id, ProductId::new("P1"));
        assert_eq!(merged.items()[0].quantity, 2);
        assert_eq!(merged.items()[1].product_id, ProductId::new("P3"));
        assert_eq!(merged.items()[1].quantity, 1);
    }

    #[test]
    fn test_merge_prefers_larger_remote_quantity() {
        let guest = CartState::from_items([print("P1")]);
        let remote = CartState::from_items([with_qty(print("P1"), 4)]);
        let merged = CartState::merge(&guest, &remote);
        assert_eq!(merged.items()[0].quantity, 4);
    }

    #[test]
    fn test_merge_forces_unique_to_one() {
        let guest = CartState::from_items([original("P2")]);
        let remote = CartState {
            items: vec![with_qty(original("P2"), 3)],
        };
        let merged = CartState::merge(&guest, &remote);
        assert_eq!(merged.items()[0].quantity, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let guest = CartState::from_items([with_qty(print("P1"), 2), print("P5")]);
        let remote = CartState::from_items([print("P1"), print("P3")]);

        let once = CartState::merge(&guest, &remote);
        let twice = CartState::merge(&guest, &once);
        assert_eq!(once, twice);
        assert_eq!(CartState::merge(&CartState::new(), &once), once);
    }
}
