//! RocketShoes cart library.
//!
//! Holds the shopper's cart in memory, checks every quantity change against
//! the catalog's stock API, and mirrors the cart into a local key-value store
//! so it survives restarts.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use rocketshoes_cart::catalog::CatalogClient;
//! use rocketshoes_cart::storage::FileStore;
//! use rocketshoes_cart::{CartConfig, CartManager};
//!
//! let config = CartConfig::from_env()?;
//! let catalog = CatalogClient::new(&config.catalog)?;
//! let store = FileStore::open(&config.storage.path)?;
//! let manager = CartManager::new(Arc::new(catalog), Arc::new(store), &config.storage.key);
//!
//! manager.add_product(ProductId::new(1)).await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod manager;
pub mod notify;
pub mod storage;

pub use config::CartConfig;
pub use error::{CartError, Operation};
pub use manager::{CartManager, CartUpdate};
pub use notify::Notification;
