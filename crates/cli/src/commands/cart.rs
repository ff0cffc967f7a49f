//! Cart commands.
//!
//! # Environment Variables
//!
//! - `CATALOG_API_URL` - Catalog/stock API the stock checks go to
//! - `CART_STORAGE_PATH` - File the cart is persisted in

use std::sync::Arc;

use rocketshoes_cart::catalog::CatalogClient;
use rocketshoes_cart::manager::UpdateProductAmount;
use rocketshoes_cart::storage::FileStore;
use rocketshoes_cart::{CartConfig, CartManager, Notification};
use rocketshoes_core::ProductId;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::display;

/// One CLI invocation's view of the cart.
pub struct CartSession {
    manager: CartManager,
    notifications: broadcast::Receiver<Notification>,
}

impl CartSession {
    /// Connect to the catalog and restore the stored cart.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built or the storage file
    /// cannot be read.
    pub fn open(config: &CartConfig) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::debug!(
            catalog = %config.catalog.base_url,
            storage = %config.storage.path.display(),
            "Opening cart"
        );

        let catalog = CatalogClient::new(&config.catalog)?;
        let store = FileStore::open(&config.storage.path)?;
        let manager = CartManager::new(Arc::new(catalog), Arc::new(store), &config.storage.key);
        let notifications = manager.notifications();

        Ok(Self {
            manager,
            notifications,
        })
    }

    pub async fn add(&self, product_id: ProductId) {
        self.manager.add_product(product_id).await;
    }

    pub async fn remove(&self, product_id: ProductId) {
        self.manager.remove_product(product_id).await;
    }

    pub async fn set(&self, product_id: ProductId, amount: i64) {
        self.manager
            .update_product_amount(UpdateProductAmount { product_id, amount })
            .await;
    }

    /// Print pending notifications to stderr and the cart to stdout.
    #[allow(clippy::print_stdout, clippy::print_stderr)]
    pub fn finish(mut self) {
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => eprintln!("{}", display::render_notification(&notification)),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped cart notifications");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        print!("{}", display::render_cart(&self.manager.cart()));
    }
}
