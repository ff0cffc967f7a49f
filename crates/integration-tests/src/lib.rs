//! Integration test support for RocketShoes.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p rocketshoes-integration-tests
//! ```
//!
//! No external services are needed: each test starts a [`FakeCatalog`] HTTP
//! server on an ephemeral port and persists the cart into a temp directory.
//!
//! # Example
//!
//! ```rust,ignore
//! let catalog = FakeCatalog::new().with_product(1, "Tênis", 179.9, 3);
//! let ctx = TestContext::new(catalog).await;
//!
//! let manager = ctx.manager();
//! manager.add_product(ProductId::new(1)).await;
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rocketshoes_cart::CartManager;
use rocketshoes_cart::catalog::CatalogClient;
use rocketshoes_cart::config::{CatalogConfig, DEFAULT_STORAGE_KEY};
use rocketshoes_cart::storage::FileStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;

// =============================================================================
// Fake catalog server
// =============================================================================

/// A catalog/stock API served by axum, with knobs for failure modes.
#[derive(Clone, Default)]
pub struct FakeCatalog {
    data: Arc<Mutex<CatalogData>>,
}

#[derive(Default)]
struct CatalogData {
    products: HashMap<i32, Value>,
    stock: HashMap<i32, i64>,
    failing: bool,
    delay: Option<Duration>,
    stock_hits: usize,
    product_hits: usize,
    last_authorization: Option<String>,
}

impl FakeCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product shaped like the RocketShoes catalog.
    #[must_use]
    pub fn with_product(self, id: i32, title: &str, price: f64, stock: i64) -> Self {
        {
            let mut data = self.lock();
            data.products.insert(
                id,
                json!({
                    "id": id,
                    "title": title,
                    "price": price,
                    "image": format!("https://rocketseat-cdn.s3-sa-east-1.amazonaws.com/{id}.jpg"),
                }),
            );
            data.stock.insert(id, stock);
        }
        self
    }

    /// Register a raw product document.
    #[must_use]
    pub fn with_raw_product(self, id: i32, product: Value, stock: i64) -> Self {
        {
            let mut data = self.lock();
            data.products.insert(id, product);
            data.stock.insert(id, stock);
        }
        self
    }

    pub fn set_stock(&self, id: i32, stock: i64) {
        self.lock().stock.insert(id, stock);
    }

    /// Answer every request with a 500.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Wait before answering every request.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    #[must_use]
    pub fn stock_hits(&self) -> usize {
        self.lock().stock_hits
    }

    #[must_use]
    pub fn product_hits(&self) -> usize {
        self.lock().product_hits
    }

    #[must_use]
    pub fn last_authorization(&self) -> Option<String> {
        self.lock().last_authorization.clone()
    }

    /// Serve on an ephemeral local port and return the base URL.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn serve(&self) -> Url {
        let app = Router::new()
            .route("/stock/{id}", get(stock))
            .route("/products/{id}", get(product))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake catalog");
        let addr: SocketAddr = listener.local_addr().expect("Failed to read local address");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake catalog server error");
        });

        Url::parse(&format!("http://{addr}/")).expect("Invalid fake catalog URL")
    }

    /// Record a request and build its response.
    fn answer(
        &self,
        headers: &HeaderMap,
        hit: impl FnOnce(&mut CatalogData) -> Option<Value>,
    ) -> (Option<Duration>, Response) {
        let mut data = self.lock();
        data.last_authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let delay = data.delay;
        let failing = data.failing;
        let body = hit(&mut *data);

        let response = if failing {
            (StatusCode::INTERNAL_SERVER_ERROR, "catalog exploded").into_response()
        } else {
            match body {
                Some(body) => Json(body).into_response(),
                // json-server answers unknown ids with 404 and an empty object
                None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
            }
        };
        (delay, response)
    }

    fn lock(&self) -> MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn stock(
    State(catalog): State<FakeCatalog>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let (delay, response) = catalog.answer(&headers, |data| {
        data.stock_hits += 1;
        data.stock
            .get(&id)
            .map(|amount| json!({ "id": id, "amount": amount }))
    });
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

async fn product(
    State(catalog): State<FakeCatalog>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let (delay, response) = catalog.answer(&headers, |data| {
        data.product_hits += 1;
        data.products.get(&id).cloned()
    });
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

// =============================================================================
// Test context
// =============================================================================

/// A running fake catalog plus a private storage directory.
pub struct TestContext {
    pub catalog: FakeCatalog,
    pub base_url: Url,
    dir: TempDir,
}

impl TestContext {
    /// Start `catalog` and create an empty storage directory.
    ///
    /// # Panics
    ///
    /// Panics if the server or temp directory cannot be created.
    pub async fn new(catalog: FakeCatalog) -> Self {
        let base_url = catalog.serve().await;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self {
            catalog,
            base_url,
            dir,
        }
    }

    /// Path of the file-backed store.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.dir.path().join("storage.json")
    }

    /// Catalog configuration pointing at the fake server.
    #[must_use]
    pub fn catalog_config(&self) -> CatalogConfig {
        let mut config = CatalogConfig::new(self.base_url.clone());
        config.timeout = Duration::from_secs(2);
        config
    }

    /// A manager over the fake catalog and the file store.
    #[must_use]
    pub fn manager(&self) -> CartManager {
        self.manager_with(&self.catalog_config())
    }

    /// A manager using a custom catalog configuration.
    ///
    /// # Panics
    ///
    /// Panics if the client or store cannot be created.
    #[must_use]
    pub fn manager_with(&self, config: &CatalogConfig) -> CartManager {
        let client = CatalogClient::new(config).expect("Failed to build catalog client");
        let store = FileStore::open(self.storage_path()).expect("Failed to open store");
        CartManager::new(Arc::new(client), Arc::new(store), DEFAULT_STORAGE_KEY)
    }

    /// Raw bytes of the storage file, if it exists.
    #[must_use]
    pub fn stored_bytes(&self) -> Option<Vec<u8>> {
        std::fs::read(self.storage_path()).ok()
    }
}
