//! Catalog and stock lookups.
//!
//! # Architecture
//!
//! - [`StockService`] is the seam the cart manager depends on
//! - [`CatalogClient`] talks to the REST catalog with `reqwest`
//! - [`InMemoryCatalog`] serves fixed data for tests and offline demos
//!
//! Stock is never cached: every quantity change re-reads it. Product
//! metadata only changes the cart's display fields, so the HTTP client keeps
//! it in a short-lived `moka` cache.
//!
//! # Endpoints
//!
//! - `GET {base}/stock/{id}` → `{ "id": 1, "amount": 3 }`
//! - `GET {base}/products/{id}` → `{ "id": 1, "title": "...", "price": 179.9, "image": "..." }`

mod client;
mod memory;

pub use client::CatalogClient;
pub use memory::InMemoryCatalog;

use async_trait::async_trait;
use rocketshoes_core::{Product, ProductId, StockRecord};
use thiserror::Error;

/// Errors that can occur when interacting with the catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The catalog has no such product or stock record.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CatalogError {
    /// Whether the catalog answered but knows nothing about the product.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Read-only access to stock levels and product metadata.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Current stock for a product.
    async fn stock(&self, product_id: ProductId) -> Result<StockRecord, CatalogError>;

    /// Catalog metadata for a product.
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError>;
}
