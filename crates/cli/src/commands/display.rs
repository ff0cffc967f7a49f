//! Plain-text rendering of the cart.

use std::fmt::Write;

use rocketshoes_cart::Notification;
use rocketshoes_core::Cart;

const TITLE_WIDTH: usize = 40;

/// Render the cart as a table with a totals line.
pub fn render_cart(cart: &Cart) -> String {
    if cart.is_empty() {
        return "Cart is empty\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<TITLE_WIDTH$}  {:>5}  {:>10}  {:>10}",
        "ID", "PRODUCT", "QTY", "PRICE", "SUBTOTAL"
    );
    for item in cart {
        let _ = writeln!(
            out,
            "{:>5}  {:<TITLE_WIDTH$}  {:>5}  {:>10}  {:>10}",
            item.product_id(),
            truncate(&item.product.title, TITLE_WIDTH),
            item.amount,
            item.product.price.to_string(),
            item.line_price().to_string(),
        );
    }
    let units = cart.total_units();
    let _ = writeln!(
        out,
        "Total: {units} {} {}",
        if units == 1 { "item" } else { "items" },
        cart.subtotal()
    );
    out
}

/// Render a failure message.
pub fn render_notification(notification: &Notification) -> String {
    format!(
        "error: {} (product {})",
        notification.message, notification.product_id
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
