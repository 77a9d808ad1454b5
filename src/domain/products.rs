//! Product presentation rules.

use super::Product;

pub const PRICE_NOT_AVAILABLE: &str = "price not available";

/// Human-readable price. A price only means something together with its currency, so a blank
/// currency is reported the same way as a missing price.
pub fn price_label(product: &Product) -> String {
    match product.price {
        Some(price) if !product.currency.trim().is_empty() => {
            format!("{price:.2} {}", product.currency.trim())
        }
        _ => PRICE_NOT_AVAILABLE.to_string(),
    }
}

pub fn author_label(product: &Product) -> &str {
    product
        .author
        .as_deref()
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .unwrap_or("Unknown author")
}
