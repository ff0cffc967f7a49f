//! Cart error handling with Sentry integration.
//!
//! Every cart operation fails with a [`CartError`]. The consumer-facing
//! operations never hand it back: they [`report`](CartError::report) it
//! (log, plus Sentry capture for infrastructure failures) and turn it into a
//! user message via [`CartError::user_message`].

use std::fmt;

use rocketshoes_core::{CartInvariantError, ProductId};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::storage::StorageError;

/// The cart operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Remove,
    UpdateAmount,
}

impl Operation {
    /// Generic message shown when the operation fails for an unexpected reason.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Add => "Failed to add product",
            Self::Remove => "Failed to remove product",
            Self::UpdateAmount => "Failed to update product amount",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::UpdateAmount => "update_amount",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message shown when a request exceeds available stock.
pub const OUT_OF_STOCK_MESSAGE: &str = "Requested quantity is out of stock";

/// Message shown when the catalog does not know a product.
pub const PRODUCT_NOT_FOUND_MESSAGE: &str = "Product not found";

/// Errors raised by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The catalog has no stock record or metadata for the product.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product is not in the cart.
    #[error("Product {0} is not in the cart")]
    NotInCart(ProductId),

    /// The cart would hold more units than the catalog has.
    #[error("Out of stock: product {product_id} needs {requested}, {available} available")]
    OutOfStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    /// Catalog lookup failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Persisting the cart failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A computed cart broke an invariant.
    #[error("Invalid cart: {0}")]
    Invariant(#[from] CartInvariantError),
}

impl CartError {
    /// Map a catalog failure for `product_id`, folding "not found" answers
    /// into [`CartError::ProductNotFound`].
    #[must_use]
    pub fn from_catalog(product_id: ProductId, err: CatalogError) -> Self {
        if err.is_not_found() {
            Self::ProductNotFound(product_id)
        } else {
            Self::Catalog(err)
        }
    }

    /// Whether the failure comes from the network, the store, or a bug rather
    /// than from a cart rule.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Catalog(_) | Self::Storage(_) | Self::Invariant(_))
    }

    /// Human-readable message for the shopper.
    #[must_use]
    pub const fn user_message(&self, operation: Operation) -> &'static str {
        match self {
            Self::OutOfStock { .. } => OUT_OF_STOCK_MESSAGE,
            Self::ProductNotFound(_) => PRODUCT_NOT_FOUND_MESSAGE,
            Self::NotInCart(_) | Self::Catalog(_) | Self::Storage(_) | Self::Invariant(_) => {
                operation.failure_message()
            }
        }
    }

    /// Log the failure, capturing infrastructure errors to Sentry.
    pub fn report(&self, operation: Operation, product_id: ProductId) {
        if self.is_infrastructure() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                %operation,
                %product_id,
                sentry_event_id = %event_id,
                "Cart operation failed"
            );
        } else {
            tracing::warn!(
                error = %self,
                %operation,
                %product_id,
                "Cart operation rejected"
            );
        }
    }
}

/// Add a breadcrumb for a cart action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// changes leading up to an error.
pub fn add_breadcrumb(operation: Operation, product_id: ProductId, amount: Option<u32>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some("cart".to_string()),
        message: Some(operation.as_str().to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    breadcrumb.data.insert(
        "product_id".to_string(),
        serde_json::Value::from(product_id.as_i32()),
    );
    if let Some(amount) = amount {
        breadcrumb
            .data
            .insert("amount".to_string(), serde_json::Value::from(amount));
    }

    sentry::add_breadcrumb(breadcrumb);
}
