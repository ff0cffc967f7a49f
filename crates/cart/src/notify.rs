//! Transient user-facing messages ("toasts").

use std::fmt;

use rocketshoes_core::ProductId;

use crate::error::{CartError, Operation};

/// A message for the shopper about a cart operation that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub operation: Operation,
    pub product_id: ProductId,
    pub message: String,
}

impl Notification {
    /// Build the notification shown for a failed operation.
    #[must_use]
    pub fn failure(operation: Operation, product_id: ProductId, err: &CartError) -> Self {
        Self {
            operation,
            product_id,
            message: err.user_message(operation).to_string(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
