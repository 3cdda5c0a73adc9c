//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! atelier cart show
//! atelier cart add P1
//! atelier cart set P1 3
//! atelier cart remove P1
//! atelier cart clear
//!
//! # Same, but synced to the shopper's remote cart
//! atelier cart --user u-42 add P1
//! ```
//!
//! `add` and `set` look the product up in the catalog file (`--catalog`) so
//! stock limits apply.

use std::fmt::Write as _;
use std::path::Path;

use clap::Subcommand;

use atelier_core::{CartCommand, CartState, ProductId, format_amount};
use atelier_sync::{CartChange, Catalog, Dispatch, RemoteStore, Result, StaticCatalog, SyncEngine};

use super::emit;

#[derive(Debug, Subcommand)]
pub enum CartAction {
    /// Print the cart
    Show,
    /// Add one unit of a product
    Add {
        /// Catalog product id
        product_id: String,
    },
    /// Remove a product from the cart
    Remove {
        /// Catalog product id
        product_id: String,
    },
    /// Set a line's quantity (clamped to stock)
    Set {
        /// Catalog product id
        product_id: String,
        /// Requested quantity
        quantity: u32,
    },
    /// Empty the cart
    Clear,
}

pub(super) async fn run<R: RemoteStore>(
    engine: &SyncEngine<R>,
    catalog: &Path,
    action: CartAction,
) -> Result<()> {
    match action {
        CartAction::Show => {}
        CartAction::Add { product_id } => {
            let catalog = StaticCatalog::load(catalog)?;
            let product = catalog.product(&ProductId::new(product_id)).await?;
            let change = engine.add_to_cart(product.to_line_item(), &catalog).await?;
            emit(&describe_change(change, &product.title));
        }
        CartAction::Remove { product_id } => {
            let dispatched = engine.dispatch_cart(CartCommand::Remove(ProductId::new(product_id)));
            if dispatched == Dispatch::Unchanged {
                emit("Not in cart");
            }
        }
        CartAction::Set {
            product_id,
            quantity,
        } => {
            let catalog = StaticCatalog::load(catalog)?;
            let id = ProductId::new(product_id);
            if engine.cart().contains(&id) {
                let change = engine.set_cart_quantity(&id, quantity, &catalog).await?;
                emit(&describe_change(change, id.as_str()));
            } else {
                emit("Not in cart");
            }
        }
        CartAction::Clear => {
            engine.dispatch_cart(CartCommand::Clear);
        }
    }

    emit(&render_cart(&engine.cart()));
    Ok(())
}

fn describe_change(change: CartChange, title: &str) -> String {
    match change {
        CartChange::Applied => format!("Updated {title}"),
        CartChange::Unchanged => format!("{title} unchanged"),
        CartChange::OutOfStock => format!("{title} is out of stock"),
        CartChange::AtStockLimit => format!("{title} is at its stock limit"),
    }
}

/// Plain-text cart listing with a total line.
pub fn render_cart(cart: &CartState) -> String {
    if cart.is_empty() {
        return "Cart is empty".to_string();
    }

    let mut out = String::new();
    for line in cart.items() {
        let _ = writeln!(
            out,
            "{:<10} {:<32} x{:<3} {:>10}",
            line.product_id.as_str(),
            line.title,
            line.quantity,
            format_amount(line.line_total())
        );
    }
    let _ = write!(
        out,
        "{} item(s), total {}",
        cart.item_count(),
        format_amount(cart.total())
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::LineItem;
    use rust_decimal::Decimal;

    #[test]
    fn test_render_cart() {
        let cart = CartState::from_items([
            LineItem::new("P1", "Harbour at Dusk", Decimal::new(4500, 2), "print"),
            LineItem::new("P2", "Blue Study No. 4", Decimal::new(120_000, 2), "painting"),
        ])
        .apply(CartCommand::SetQuantity(ProductId::new("P1"), 2));

        let text = render_cart(&cart);

        assert!(text.contains("Harbour at Dusk"));
        assert!(text.contains("x2"));
        assert!(text.ends_with("3 item(s), total $1290.00"));
    }

    #[test]
    fn test_render_empty_cart() {
        assert_eq!(render_cart(&CartState::new()), "Cart is empty");
    }

    #[test]
    fn test_describe_change() {
        assert_eq!(
            describe_change(CartChange::AtStockLimit, "Blue Study"),
            "Blue Study is at its stock limit"
        );
    }
}
