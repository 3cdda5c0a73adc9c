//! Wishlist state and reducer.
//!
//! A wishlist is a set of product ids. Insertion order is kept only so the
//! serialized form is stable.

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Commands accepted by the wishlist reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistCommand {
    Add(ProductId),
    Remove(ProductId),
    /// Add the id if absent, remove it if present.
    Toggle(ProductId),
    Clear,
    /// Swap in a whole new state. Reserved for hydration, merge and remote sync.
    Replace(WishlistState),
}

/// A set of product ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "WishlistStateRepr")]
pub struct WishlistState {
    items: Vec<ProductId>,
}

#[derive(Deserialize)]
struct WishlistStateRepr {
    #[serde(default)]
    items: Vec<ProductId>,
}

impl From<WishlistStateRepr> for WishlistState {
    fn from(repr: WishlistStateRepr) -> Self {
        Self::from_ids(repr.items)
    }
}

impl WishlistState {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a wishlist, dropping duplicate ids.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = ProductId>) -> Self {
        let mut items: Vec<ProductId> = Vec::new();
        for id in ids {
            if !items.contains(&id) {
                items.push(id);
            }
        }
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[ProductId] {
        &self.items
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.items.contains(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Apply a command, returning the next state.
    #[must_use]
    pub fn apply(mut self, command: WishlistCommand) -> Self {
        match command {
            WishlistCommand::Add(id) => {
                if !self.contains(&id) {
                    self.items.push(id);
                }
                self
            }
            WishlistCommand::Remove(id) => {
                self.items.retain(|i| i != &id);
                self
            }
            WishlistCommand::Toggle(id) => {
                if self.contains(&id) {
                    self.items.retain(|i| i != &id);
                } else {
                    self.items.push(id);
                }
                self
            }
            WishlistCommand::Clear => Self::new(),
            WishlistCommand::Replace(state) => state,
        }
    }

    /// Union of a guest wishlist and the remote one, remote order first.
    #[must_use]
    pub fn merge(guest: &Self, remote: &Self) -> Self {
        Self::from_ids(remote.items.iter().chain(guest.items.iter()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ProductId {
        ProductId::new(s)
    }

    #[test]
    fn test_add_is_idempotent() {
        let state = WishlistState::new()
            .apply(WishlistCommand::Add(id("P1")))
            .apply(WishlistCommand::Add(id("P1")));
        assert_eq!(state.items(), &[id("P1")]);
    }

    #[test]
    fn test_toggle() {
        let state = WishlistState::new().apply(WishlistCommand::Toggle(id("P1")));
        assert!(state.contains(&id("P1")));
        let state = state.apply(WishlistCommand::Toggle(id("P1")));
        assert!(state.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let state = WishlistState::from_ids([id("P1"), id("P2")])
            .apply(WishlistCommand::Remove(id("P1")));
        assert_eq!(state.items(), &[id("P2")]);
        assert!(state.apply(WishlistCommand::Clear).is_empty());
    }

    #[test]
    fn test_merge_is_union() {
        let guest = WishlistState::from_ids([id("P1"), id("P2")]);
        let remote = WishlistState::from_ids([id("P3"), id("P1")]);
        let merged = WishlistState::merge(&guest, &remote);
        assert_eq!(merged.items(), &[id("P3"), id("P1"), id("P2")]);
        assert_eq!(WishlistState::merge(&guest, &merged), merged);
    }

    #[test]
    fn test_deserialize_drops_duplicates() {
        let state: WishlistState =
            serde_json::from_str(r#"{"items":["P1","P1","P2"]}"#).unwrap_or_default();
        assert_eq!(state.len(), 2);
    }
}
