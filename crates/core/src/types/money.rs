//! Decimal money helpers.
//!
//! Prices are carried as `rust_decimal::Decimal` in the gallery's single
//! store currency; no floating point arithmetic happens on amounts.

use rust_decimal::Decimal;

/// Price of `quantity` units at `unit_price`.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Format an amount for display, e.g. `$19.99`.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(Decimal::new(1999, 2), 3), Decimal::new(5997, 2));
        assert_eq!(line_total(Decimal::new(1999, 2), 0), Decimal::ZERO);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::new(125_000, 2)), "$1250.00");
        assert_eq!(format_amount(Decimal::new(5, 1)), "$0.50");
    }
}
