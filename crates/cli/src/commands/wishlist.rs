//! Wishlist commands.

use clap::Subcommand;

use atelier_core::{ProductId, WishlistCommand, WishlistState};
use atelier_sync::{RemoteStore, SyncEngine};

use super::emit;

#[derive(Debug, Subcommand)]
pub enum WishlistAction {
    /// Print the wishlist
    Show,
    /// Add a product if absent, remove it if present
    Toggle {
        /// Catalog product id
        product_id: String,
    },
}

pub(super) fn run<R: RemoteStore>(engine: &SyncEngine<R>, action: WishlistAction) {
    if let WishlistAction::Toggle { product_id } = action {
        engine.dispatch_wishlist(WishlistCommand::Toggle(ProductId::new(product_id)));
    }
    emit(&render_wishlist(&engine.wishlist()));
}

/// One product id per line.
pub fn render_wishlist(wishlist: &WishlistState) -> String {
    if wishlist.is_empty() {
        return "Wishlist is empty".to_string();
    }
    wishlist
        .items()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_wishlist() {
        let wishlist = WishlistState::from_ids([ProductId::new("P1"), ProductId::new("P7")]);
        assert_eq!(render_wishlist(&wishlist), "P1\nP7");
        assert_eq!(render_wishlist(&WishlistState::new()), "Wishlist is empty");
    }
}
