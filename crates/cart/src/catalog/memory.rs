//! In-memory catalog for tests and offline demos.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rocketshoes_core::{Product, ProductId, StockRecord};

use super::{CatalogError, StockService};

/// A catalog backed by plain maps.
///
/// Can be switched offline to simulate network failures, and counts the
/// requests it serves so callers can assert when stock was consulted.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    stock: HashMap<ProductId, i64>,
    offline: bool,
    stock_requests: usize,
    product_requests: usize,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product with its stock level.
    #[must_use]
    pub fn with_product(self, product: Product, stock: i64) -> Self {
        {
            let mut state = self.lock();
            state.stock.insert(product.id, stock);
            state.products.insert(product.id, product);
        }
        self
    }

    /// Register a stock level without product metadata.
    #[must_use]
    pub fn with_stock(self, product_id: ProductId, stock: i64) -> Self {
        self.set_stock(product_id, stock);
        self
    }

    pub fn set_stock(&self, product_id: ProductId, stock: i64) {
        self.lock().stock.insert(product_id, stock);
    }

    /// While offline every lookup fails with a 503.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    #[must_use]
    pub fn stock_requests(&self) -> usize {
        self.lock().stock_requests
    }

    #[must_use]
    pub fn product_requests(&self) -> usize {
        self.lock().product_requests
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn offline_error() -> CatalogError {
    CatalogError::Api {
        status: 503,
        message: "catalog offline".to_string(),
    }
}

#[async_trait]
impl StockService for InMemoryCatalog {
    async fn stock(&self, product_id: ProductId) -> Result<StockRecord, CatalogError> {
        let mut state = self.lock();
        state.stock_requests += 1;
        if state.offline {
            return Err(offline_error());
        }
        state
            .stock
            .get(&product_id)
            .map(|amount| StockRecord::new(product_id, *amount))
            .ok_or_else(|| CatalogError::NotFound(format!("stock/{product_id}")))
    }

    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        let mut state = self.lock();
        state.product_requests += 1;
        if state.offline {
            return Err(offline_error());
        }
        state
            .products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("products/{product_id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rocketshoes_core::Price;

    use super::*;

    fn sneaker() -> Product {
        Product {
            id: ProductId::new(1),
            title: "Sneaker".to_string(),
            price: Price::ZERO,
            image: "sneaker.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_serves_registered_data() {
        let catalog = InMemoryCatalog::new().with_product(sneaker(), 3);

        let stock = catalog.stock(ProductId::new(1)).await.unwrap();
        assert_eq!(stock.amount, 3);
        assert_eq!(catalog.product(ProductId::new(1)).await.unwrap(), sneaker());
        assert_eq!(catalog.stock_requests(), 1);
        assert_eq!(catalog.product_requests(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let catalog = InMemoryCatalog::new().with_stock(ProductId::new(2), 1);

        assert!(catalog.stock(ProductId::new(9)).await.unwrap_err().is_not_found());
        assert!(catalog.product(ProductId::new(2)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_offline_fails_every_lookup() {
        let catalog = InMemoryCatalog::new().with_product(sneaker(), 3);
        catalog.set_offline(true);

        let err = catalog.stock(ProductId::new(1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Api { status: 503, .. }));
        assert!(catalog.product(ProductId::new(1)).await.is_err());
    }
}
