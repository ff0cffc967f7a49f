//! Local persistent key-value storage.
//!
//! The cart is stored as a single JSON document under a fixed key, the same
//! way a browser storefront keeps it in `localStorage`. Stores are
//! synchronous: a write either lands before the cart manager commits the new
//! cart, or the manager keeps the old one.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use rocketshoes_core::Cart;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when reading or writing a store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store refuses writes.
    #[error("Store is read-only")]
    ReadOnly,
}

/// String-keyed, string-valued synchronous storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write did not land.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Reads and writes the cart document under one key.
#[derive(Clone)]
pub struct CartStorage {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl CartStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Restore the stored cart.
    ///
    /// Missing, unreadable, or malformed data yields an empty cart. A stored
    /// document must be an array of line items with positive amounts and
    /// unique product ids.
    #[must_use]
    pub fn load(&self) -> Cart {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "No stored cart");
                return Cart::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored cart, starting empty");
                return Cart::new();
            }
        };

        match serde_json::from_str::<Cart>(&raw) {
            Ok(cart) => {
                debug!(key = %self.key, items = cart.len(), "Restored cart");
                cart
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored cart is malformed, starting empty");
                Cart::new()
            }
        }
    }

    /// Overwrite the stored cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if serialization or the write fails.
    pub fn save(&self, cart: &Cart) -> Result<(), StorageError> {
        let raw = serde_json::to_string(cart)?;
        self.store.set(&self.key, &raw)
    }
}

impl std::fmt::Debug for CartStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStorage")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
