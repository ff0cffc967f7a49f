//! The cart manager.
//!
//! Owns the in-memory cart and applies the three cart operations against it.
//! Each operation:
//!
//! 1. takes the cart lock (operations never interleave),
//! 2. consults the stock service if the change can grow the cart,
//! 3. computes the new cart on a copy,
//! 4. writes the copy to the persistent store,
//! 5. swaps it in and publishes the new snapshot.
//!
//! Any failure before step 5 leaves both the in-memory and the stored cart
//! untouched.

use std::sync::Arc;

use rocketshoes_core::{Cart, LineItem, ProductId, StockRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, instrument};

use crate::catalog::StockService;
use crate::error::{CartError, Operation, add_breadcrumb};
use crate::notify::Notification;
use crate::storage::{CartStorage, KeyValueStore};

/// Notifications buffered per subscriber before the oldest are dropped.
const NOTIFICATION_CAPACITY: usize = 32;

/// Whether an operation changed the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartUpdate {
    /// The new cart was persisted and published.
    Applied,
    /// Nothing changed: the request was a no-op or it failed.
    Unchanged,
}

impl CartUpdate {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Request to set a line item's amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductAmount {
    pub product_id: ProductId,
    /// Target amount; zero or negative requests are ignored.
    pub amount: i64,
}

/// Stock-checked, persisted shopping cart.
///
/// Built with explicit references to its stock service and store. Consumers
/// read the current cart with [`cart`](Self::cart), watch it with
/// [`subscribe`](Self::subscribe), and receive failure messages from
/// [`notifications`](Self::notifications).
pub struct CartManager {
    stock: Arc<dyn StockService>,
    storage: CartStorage,
    cart: Mutex<Cart>,
    snapshots: watch::Sender<Cart>,
    notifications: broadcast::Sender<Notification>,
}

impl CartManager {
    /// Create a manager, restoring the cart stored under `key`.
    ///
    /// Missing or malformed stored data yields an empty cart.
    pub fn new(
        stock: Arc<dyn StockService>,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
    ) -> Self {
        let storage = CartStorage::new(store, key);
        let cart = storage.load();
        info!(
            key = storage.key(),
            items = cart.len(),
            units = cart.total_units(),
            "Cart loaded"
        );

        let (snapshots, _) = watch::channel(cart.clone());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            stock,
            storage,
            cart: Mutex::new(cart),
            snapshots,
            notifications,
        }
    }

    /// The latest committed cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.snapshots.borrow().clone()
    }

    /// Watch committed carts.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.snapshots.subscribe()
    }

    /// Receive failure messages from operations issued after this call.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    // =========================================================================
    // Consumer-facing operations
    // =========================================================================

    /// Add one unit of a product.
    ///
    /// Failures are reported and published as notifications.
    pub async fn add_product(&self, product_id: ProductId) -> CartUpdate {
        let result = self.try_add_product(product_id).await;
        self.settle(Operation::Add, product_id, result)
    }

    /// Remove a product's line.
    ///
    /// Failures are reported and published as notifications.
    pub async fn remove_product(&self, product_id: ProductId) -> CartUpdate {
        let result = self.try_remove_product(product_id).await;
        self.settle(Operation::Remove, product_id, result)
    }

    /// Set a product's amount.
    ///
    /// Failures are reported and published as notifications.
    pub async fn update_product_amount(&self, update: UpdateProductAmount) -> CartUpdate {
        let result = self.try_update_product_amount(update).await;
        self.settle(Operation::UpdateAmount, update.product_id, result)
    }

    fn settle(
        &self,
        operation: Operation,
        product_id: ProductId,
        result: Result<CartUpdate, CartError>,
    ) -> CartUpdate {
        match result {
            Ok(update) => update,
            Err(err) => {
                err.report(operation, product_id);
                // No subscribers is fine
                let _ = self
                    .notifications
                    .send(Notification::failure(operation, product_id, &err));
                CartUpdate::Unchanged
            }
        }
    }

    // =========================================================================
    // Fallible operations
    // =========================================================================

    /// Add one unit of a product.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if the catalog has no stock or metadata for it
    /// - `OutOfStock` if the cart would hold more units than available
    /// - `Catalog` / `Storage` on network or persistence failure
    #[instrument(skip(self))]
    pub async fn try_add_product(&self, product_id: ProductId) -> Result<CartUpdate, CartError> {
        let mut cart = self.cart.lock().await;

        let held = cart.amount_of(product_id);
        let requested = u64::from(held) + 1;
        let stock = self.fetch_stock(product_id).await?;

        if !stock.covers(requested) || held == u32::MAX {
            return Err(CartError::OutOfStock {
                product_id,
                requested,
                available: stock.amount,
            });
        }

        let mut next = cart.clone();
        if !next.increment(product_id) {
            let product = self
                .stock
                .product(product_id)
                .await
                .map_err(|e| CartError::from_catalog(product_id, e))?;

            if product.id != product_id {
                tracing::warn!(
                    returned_id = %product.id,
                    "Catalog returned a different product"
                );
                return Err(CartError::ProductNotFound(product_id));
            }

            next.push(LineItem::new(product))?;
        }

        self.commit(&mut cart, next)?;

        let amount = cart.amount_of(product_id);
        add_breadcrumb(Operation::Add, product_id, Some(amount));
        info!(amount, "Product added to cart");
        Ok(CartUpdate::Applied)
    }

    /// Remove a product's line.
    ///
    /// # Errors
    ///
    /// - `NotInCart` if the product has no line
    /// - `Storage` on persistence failure
    #[instrument(skip(self))]
    pub async fn try_remove_product(
        &self,
        product_id: ProductId,
    ) -> Result<CartUpdate, CartError> {
        let mut cart = self.cart.lock().await;

        let mut next = cart.clone();
        if next.remove(product_id).is_none() {
            return Err(CartError::NotInCart(product_id));
        }

        self.commit(&mut cart, next)?;

        add_breadcrumb(Operation::Remove, product_id, None);
        info!("Product removed from cart");
        Ok(CartUpdate::Applied)
    }

    /// Set a product's amount.
    ///
    /// Zero or negative amounts are ignored. Unless the amount decreases the
    /// current one, stock is checked first; a product not in the cart that
    /// passes the check is then left alone. Decreases are applied without
    /// consulting stock.
    ///
    /// # Errors
    ///
    /// - `OutOfStock` if a non-decreasing amount exceeds available stock
    /// - `ProductNotFound` if the catalog has no stock record
    /// - `Catalog` / `Storage` on network or persistence failure
    #[instrument(skip(self))]
    pub async fn try_update_product_amount(
        &self,
        update: UpdateProductAmount,
    ) -> Result<CartUpdate, CartError> {
        let UpdateProductAmount { product_id, amount } = update;

        if amount <= 0 {
            debug!("Ignoring non-positive amount");
            return Ok(CartUpdate::Unchanged);
        }

        let mut cart = self.cart.lock().await;

        let current = cart.get(product_id).map(|item| item.amount);
        let out_of_stock = |available: i64| CartError::OutOfStock {
            product_id,
            requested: amount.unsigned_abs(),
            available,
        };

        // A product missing from the cart counts as an increase
        let is_decrease = current.is_some_and(|current| amount < i64::from(current));
        let available = if is_decrease {
            None
        } else {
            let stock = self.fetch_stock(product_id).await?;
            if stock.remaining_after(amount.unsigned_abs()) < 0 {
                return Err(out_of_stock(stock.amount));
            }
            Some(stock.amount)
        };

        let Some(current) = current else {
            debug!("Product not in cart, nothing to update");
            return Ok(CartUpdate::Unchanged);
        };

        let new_amount = u32::try_from(amount)
            .map_err(|_| out_of_stock(available.unwrap_or_default()))?;

        let mut next = cart.clone();
        next.set_amount(product_id, new_amount);
        self.commit(&mut cart, next)?;

        add_breadcrumb(Operation::UpdateAmount, product_id, Some(new_amount));
        info!(from = current, to = new_amount, "Product amount updated");
        Ok(CartUpdate::Applied)
    }

    /// Current stock for `product_id`, rejecting records for another product.
    async fn fetch_stock(&self, product_id: ProductId) -> Result<StockRecord, CartError> {
        let stock = self
            .stock
            .stock(product_id)
            .await
            .map_err(|e| CartError::from_catalog(product_id, e))?;

        if stock.id != product_id {
            tracing::warn!(returned_id = %stock.id, "Catalog returned stock for a different product");
            return Err(CartError::ProductNotFound(product_id));
        }
        Ok(stock)
    }

    /// Persist `next`, then make it the current cart and publish it.
    fn commit(&self, current: &mut Cart, next: Cart) -> Result<(), CartError> {
        self.storage.save(&next)?;
        *current = next;
        self.snapshots.send_replace(current.clone());
        Ok(())
    }
}

impl std::fmt::Debug for CartManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartManager")
            .field("storage", &self.storage)
            .field("cart", &*self.snapshots.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use async_trait::async_trait;
    use rocketshoes_core::{Price, Product};
    use rust_decimal::Decimal;

    use super::*;
    use crate::catalog::{CatalogError, InMemoryCatalog};
    use crate::storage::MemoryStore;

    const KEY: &str = "@RocketShoes:cart";

    fn shoe(id: i32) -> Product {
        Product {
            id: ProductId::new(id),
            title: format!("Tênis {id}"),
            price: Price::new(Decimal::from_str("139.90").unwrap()),
            image: format!("https://example.com/{id}.jpg"),
        }
    }

    fn id(id: i32) -> ProductId {
        ProductId::new(id)
    }

    fn stored_cart(items: &[(i32, u32)]) -> String {
        let cart = Cart::from_items(
            items
                .iter()
                .map(|(id, amount)| LineItem {
                    product: shoe(*id),
                    amount: *amount,
                })
                .collect(),
        )
        .unwrap();
        serde_json::to_string(&cart).unwrap()
    }

    struct Harness {
        catalog: Arc<InMemoryCatalog>,
        store: Arc<MemoryStore>,
        manager: CartManager,
    }

    impl Harness {
        fn new(catalog: InMemoryCatalog, stored: &[(i32, u32)]) -> Self {
            let catalog = Arc::new(catalog);
            let store = Arc::new(MemoryStore::new());
            if !stored.is_empty() {
                store.set(KEY, &stored_cart(stored)).unwrap();
            }
            let manager = CartManager::new(catalog.clone(), store.clone(), KEY);
            Self {
                catalog,
                store,
                manager,
            }
        }

        fn stored(&self) -> Option<String> {
            self.store.get(KEY).unwrap()
        }

        fn amounts(&self) -> Vec<(i32, u32)> {
            self.manager
                .cart()
                .iter()
                .map(|item| (item.product_id().as_i32(), item.amount))
                .collect()
        }
    }

    fn catalog(products: &[(i32, i64)]) -> InMemoryCatalog {
        products
            .iter()
            .fold(InMemoryCatalog::new(), |catalog, (id, stock)| {
                catalog.with_product(shoe(*id), *stock)
            })
    }

    // =========================================================================
    // add_product
    // =========================================================================

    #[tokio::test]
    async fn test_add_new_product_inserts_one_unit() {
        let h = Harness::new(catalog(&[(1, 3)]), &[]);

        let update = h.manager.add_product(id(1)).await;

        assert_eq!(update, CartUpdate::Applied);
        assert_eq!(h.amounts(), vec![(1, 1)]);
        assert_eq!(h.manager.cart().items()[0].product, shoe(1));
        assert_eq!(h.stored().unwrap(), stored_cart(&[(1, 1)]));
    }

    #[tokio::test]
    async fn test_add_existing_product_increments() {
        let h = Harness::new(catalog(&[(1, 3), (2, 5)]), &[(1, 1), (2, 2)]);

        h.manager.add_product(id(2)).await;

        assert_eq!(h.amounts(), vec![(1, 1), (2, 3)]);
        // Metadata already held, only stock is consulted
        assert_eq!(h.catalog.product_requests(), 0);
        assert_eq!(h.catalog.stock_requests(), 1);
    }

    #[tokio::test]
    async fn test_add_up_to_exact_stock() {
        let h = Harness::new(catalog(&[(1, 2)]), &[(1, 1)]);

        assert!(h.manager.add_product(id(1)).await.is_applied());
        assert_eq!(h.amounts(), vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_add_beyond_stock_is_rejected() {
        let h = Harness::new(catalog(&[(1, 2)]), &[(1, 2)]);
        let before = h.stored();
        let mut notifications = h.manager.notifications();

        let update = h.manager.add_product(id(1)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 2)]);
        assert_eq!(h.stored(), before);

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.operation, Operation::Add);
        assert_eq!(notification.message, "Requested quantity is out of stock");
    }

    #[tokio::test]
    async fn test_add_with_zero_stock_is_rejected() {
        let h = Harness::new(catalog(&[(1, 0)]), &[]);

        let err = h.manager.try_add_product(id(1)).await.unwrap_err();

        assert!(matches!(
            err,
            CartError::OutOfStock {
                requested: 1,
                available: 0,
                ..
            }
        ));
        assert!(h.manager.cart().is_empty());
        assert_eq!(h.catalog.product_requests(), 0);
        assert_eq!(h.stored(), None);
    }

    #[tokio::test]
    async fn test_add_unknown_product_reports_not_found() {
        let h = Harness::new(catalog(&[]), &[]);
        let mut notifications = h.manager.notifications();

        let update = h.manager.add_product(id(42)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert!(h.manager.cart().is_empty());
        assert_eq!(notifications.try_recv().unwrap().message, "Product not found");
    }

    #[tokio::test]
    async fn test_add_with_stock_but_no_metadata_reports_not_found() {
        let h = Harness::new(InMemoryCatalog::new().with_stock(id(7), 4), &[]);

        let err = h.manager.try_add_product(id(7)).await.unwrap_err();

        assert!(matches!(err, CartError::ProductNotFound(p) if p == id(7)));
        assert!(h.manager.cart().is_empty());
        assert_eq!(h.stored(), None);
    }

    #[tokio::test]
    async fn test_add_while_offline_reports_generic_failure() {
        let h = Harness::new(catalog(&[(1, 3)]), &[(1, 1)]);
        h.catalog.set_offline(true);
        let mut notifications = h.manager.notifications();

        let update = h.manager.add_product(id(1)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 1)]);
        assert_eq!(notifications.try_recv().unwrap().message, "Failed to add product");
    }

    #[tokio::test]
    async fn test_add_with_mismatched_catalog_id_is_not_found() {
        struct WrongProduct;

        #[async_trait]
        impl StockService for WrongProduct {
            async fn stock(&self, product_id: ProductId) -> Result<StockRecord, CatalogError> {
                Ok(StockRecord::new(product_id, 10))
            }

            async fn product(&self, _product_id: ProductId) -> Result<Product, CatalogError> {
                Ok(shoe(99))
            }
        }

        let store = Arc::new(MemoryStore::new());
        let manager = CartManager::new(Arc::new(WrongProduct), store, KEY);

        let err = manager.try_add_product(id(1)).await.unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(p) if p == id(1)));
        assert!(manager.cart().is_empty());
    }

    struct MisroutedStock;

    #[async_trait]
    impl StockService for MisroutedStock {
        async fn stock(&self, _product_id: ProductId) -> Result<StockRecord, CatalogError> {
            Ok(StockRecord::new(id(99), 10))
        }

        async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
            Ok(shoe(product_id.as_i32()))
        }
    }

    #[tokio::test]
    async fn test_stock_for_another_product_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, &stored_cart(&[(1, 1)])).unwrap();
        let manager = CartManager::new(Arc::new(MisroutedStock), store.clone(), KEY);

        let err = manager.try_add_product(id(2)).await.unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(p) if p == id(2)));

        let err = manager
            .try_update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(p) if p == id(1)));

        assert_eq!(manager.cart().amount_of(id(1)), 1);
        assert_eq!(manager.cart().len(), 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_add_at_max_amount_is_out_of_stock() {
        let h = Harness::new(catalog(&[(1, i64::MAX)]), &[(1, u32::MAX)]);
        let mut notifications = h.manager.notifications();
        let before = h.stored();

        let update = h.manager.add_product(id(1)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, u32::MAX)]);
        assert_eq!(h.stored(), before);
        assert_eq!(
            notifications.try_recv().unwrap().message,
            "Requested quantity is out of stock"
        );
    }

    #[tokio::test]
    async fn test_add_keeps_memory_when_store_write_fails() {
        let h = Harness::new(catalog(&[(1, 3)]), &[(1, 1)]);
        h.store.set_read_only(true);
        let mut notifications = h.manager.notifications();

        let update = h.manager.add_product(id(1)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 1)]);
        assert_eq!(notifications.try_recv().unwrap().message, "Failed to add product");
    }

    // =========================================================================
    // remove_product
    // =========================================================================

    #[tokio::test]
    async fn test_remove_drops_only_that_line() {
        let h = Harness::new(catalog(&[]), &[(1, 1), (2, 4), (3, 2)]);

        let update = h.manager.remove_product(id(2)).await;

        assert_eq!(update, CartUpdate::Applied);
        assert_eq!(h.amounts(), vec![(1, 1), (3, 2)]);
        assert_eq!(h.stored().unwrap(), stored_cart(&[(1, 1), (3, 2)]));
        assert_eq!(h.catalog.stock_requests(), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_product_notifies() {
        let h = Harness::new(catalog(&[]), &[(1, 1)]);
        let writes = h.store.writes();
        let mut notifications = h.manager.notifications();

        let update = h.manager.remove_product(id(2)).await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 1)]);
        assert_eq!(h.store.writes(), writes);

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.operation, Operation::Remove);
        assert_eq!(notification.message, "Failed to remove product");
    }

    #[tokio::test]
    async fn test_remove_last_item_persists_empty_cart() {
        let h = Harness::new(catalog(&[]), &[(1, 1)]);

        h.manager.remove_product(id(1)).await;

        assert!(h.manager.cart().is_empty());
        assert_eq!(h.stored().as_deref(), Some("[]"));
    }

    // =========================================================================
    // update_product_amount
    // =========================================================================

    #[tokio::test]
    async fn test_update_within_stock() {
        let h = Harness::new(catalog(&[(1, 5)]), &[(1, 2)]);

        let update = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 4,
            })
            .await;

        assert_eq!(update, CartUpdate::Applied);
        assert_eq!(h.amounts(), vec![(1, 4)]);
        assert_eq!(h.stored().unwrap(), stored_cart(&[(1, 4)]));
    }

    #[tokio::test]
    async fn test_update_beyond_stock_is_rejected() {
        let h = Harness::new(catalog(&[(1, 5)]), &[(1, 4)]);
        let mut notifications = h.manager.notifications();

        let update = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 10,
            })
            .await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 4)]);

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.operation, Operation::UpdateAmount);
        assert_eq!(notification.message, "Requested quantity is out of stock");
    }

    #[tokio::test]
    async fn test_update_non_positive_is_noop() {
        let h = Harness::new(catalog(&[(1, 5)]), &[(1, 2)]);
        let mut notifications = h.manager.notifications();

        for amount in [0, -1, -100] {
            let update = h
                .manager
                .update_product_amount(UpdateProductAmount {
                    product_id: id(1),
                    amount,
                })
                .await;
            assert_eq!(update, CartUpdate::Unchanged);
        }

        assert_eq!(h.amounts(), vec![(1, 2)]);
        assert_eq!(h.catalog.stock_requests(), 0);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_absent_product_within_stock_is_noop() {
        let h = Harness::new(catalog(&[(1, 5), (2, 5)]), &[(1, 2)]);
        let mut notifications = h.manager.notifications();

        let update = h
            .manager
            .try_update_product_amount(UpdateProductAmount {
                product_id: id(2),
                amount: 3,
            })
            .await
            .unwrap();

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 2)]);
        assert_eq!(h.catalog.stock_requests(), 1);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_absent_product_beyond_stock_is_rejected() {
        let h = Harness::new(InMemoryCatalog::new().with_stock(id(2), 1), &[]);
        let mut notifications = h.manager.notifications();

        let update = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(2),
                amount: 5,
            })
            .await;

        assert_eq!(update, CartUpdate::Unchanged);
        assert_eq!(h.catalog.stock_requests(), 1);
        assert!(h.manager.cart().is_empty());
        assert!(h.stored().is_none());

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.operation, Operation::UpdateAmount);
        assert_eq!(notification.product_id, id(2));
        assert_eq!(notification.message, "Requested quantity is out of stock");
    }

    #[tokio::test]
    async fn test_update_absent_product_while_offline_reports_generic_failure() {
        let h = Harness::new(catalog(&[(2, 5)]), &[]);
        h.catalog.set_offline(true);
        let mut notifications = h.manager.notifications();

        h.manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(2),
                amount: 1,
            })
            .await;

        assert_eq!(
            notifications.try_recv().unwrap().message,
            "Failed to update product amount"
        );
    }

    #[tokio::test]
    async fn test_update_decrease_skips_stock_check() {
        // Stock dropped below what the cart already holds
        let h = Harness::new(catalog(&[(1, 1)]), &[(1, 4)]);

        let update = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 3,
            })
            .await;

        assert_eq!(update, CartUpdate::Applied);
        assert_eq!(h.amounts(), vec![(1, 3)]);
        assert_eq!(h.catalog.stock_requests(), 0);
    }

    #[tokio::test]
    async fn test_update_same_amount_checks_stock() {
        let h = Harness::new(catalog(&[(1, 1)]), &[(1, 2)]);

        let err = h
            .manager
            .try_update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 2,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CartError::OutOfStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(h.catalog.stock_requests(), 1);
    }

    #[tokio::test]
    async fn test_update_while_offline_reports_generic_failure() {
        let h = Harness::new(catalog(&[(1, 5)]), &[(1, 2)]);
        h.catalog.set_offline(true);
        let mut notifications = h.manager.notifications();

        h.manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 3,
            })
            .await;

        assert_eq!(h.amounts(), vec![(1, 2)]);
        assert_eq!(
            notifications.try_recv().unwrap().message,
            "Failed to update product amount"
        );
    }

    #[tokio::test]
    async fn test_update_scenario_from_two_to_four_then_ten() {
        let h = Harness::new(catalog(&[(1, 5)]), &[(1, 2)]);

        let first = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 4,
            })
            .await;
        let second = h
            .manager
            .update_product_amount(UpdateProductAmount {
                product_id: id(1),
                amount: 10,
            })
            .await;

        assert_eq!(first, CartUpdate::Applied);
        assert_eq!(second, CartUpdate::Unchanged);
        assert_eq!(h.amounts(), vec![(1, 4)]);
    }

    // =========================================================================
    // Snapshots, persistence and concurrency
    // =========================================================================

    #[tokio::test]
    async fn test_restores_stored_cart() {
        let h = Harness::new(catalog(&[]), &[(3, 1), (1, 2)]);
        assert_eq!(h.amounts(), vec![(3, 1), (1, 2)]);
    }

    #[tokio::test]
    async fn test_malformed_stored_cart_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "[{\"id\":1}]").unwrap();

        let manager = CartManager::new(Arc::new(InMemoryCatalog::new()), store, KEY);
        assert!(manager.cart().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_snapshots_only() {
        let h = Harness::new(catalog(&[(1, 1)]), &[]);
        let mut snapshots = h.manager.subscribe();

        h.manager.add_product(id(1)).await;
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().amount_of(id(1)), 1);

        // Rejected: stock is exhausted
        h.manager.add_product(id(1)).await;
        assert!(!snapshots.has_changed().unwrap());
    }

    /// Catalog that yields before answering, so overlapping operations
    /// really do overlap.
    struct SlowCatalog(InMemoryCatalog);

    #[async_trait]
    impl StockService for SlowCatalog {
        async fn stock(&self, product_id: ProductId) -> Result<StockRecord, CatalogError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.stock(product_id).await
        }

        async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.product(product_id).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_adds_do_not_oversell() {
        let catalog = SlowCatalog(InMemoryCatalog::new().with_product(shoe(1), 1));
        let manager = CartManager::new(Arc::new(catalog), Arc::new(MemoryStore::new()), KEY);

        let (first, second) = tokio::join!(manager.add_product(id(1)), manager.add_product(id(1)));

        let applied = [first, second]
            .into_iter()
            .filter(|update| update.is_applied())
            .count();
        assert_eq!(applied, 1);
        assert_eq!(manager.cart().amount_of(id(1)), 1);
    }
}
