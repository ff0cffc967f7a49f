//! Catalog records returned by the stock/product API.

use serde::{Deserialize, Serialize};

use super::{Price, ProductId};

/// Product metadata as served by `GET /products/{id}`.
///
/// Only the fields the cart displays are kept; anything else the catalog
/// sends is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Price,
    pub image: String,
}

/// Available stock as served by `GET /stock/{id}`.
///
/// Signed, because the catalog is not trusted to never report a negative
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: ProductId,
    pub amount: i64,
}

impl StockRecord {
    /// Create a new stock record.
    #[must_use]
    pub const fn new(id: ProductId, amount: i64) -> Self {
        Self { id, amount }
    }

    /// Units left in stock once `units` are reserved by the cart.
    ///
    /// Negative when the reservation exceeds availability.
    #[must_use]
    pub fn remaining_after(&self, units: u64) -> i64 {
        i64::try_from(units).map_or(i64::MIN, |units| self.amount.saturating_sub(units))
    }

    /// Whether `units` can be held in the cart.
    #[must_use]
    pub fn covers(&self, units: u64) -> bool {
        self.remaining_after(units) >= 0
    }
}
