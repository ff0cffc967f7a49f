//! REST catalog client.
//!
//! Uses `reqwest` for HTTP and caches product metadata using `moka`.

use std::sync::Arc;

use moka::future::Cache;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use rocketshoes_core::{Product, ProductId, StockRecord};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{CatalogError, StockService};
use crate::config::CatalogConfig;

/// Client for the catalog/stock REST API.
///
/// Cheap to clone; clones share the connection pool and product cache.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: Url,
    products: Option<Cache<ProductId, Product>>,
}

impl CatalogClient {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.api_token {
            let auth_value = format!("Bearer {}", token.expose_secret());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| CatalogError::Parse(format!("Invalid API token format: {e}")))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let products = config.product_cache_ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(1000)
                .time_to_live(ttl)
                .build()
        });

        Ok(Self {
            inner: Arc::new(CatalogClientInner {
                client,
                base_url: config.base_url.clone(),
                products,
            }),
        })
    }

    /// Fetch and decode a JSON resource relative to the base URL.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let url = self.inner.base_url.join(path)?;

        let response = self.inner.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(path.to_string()));
        }

        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                path,
                body = %body.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                path,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse catalog response"
            );
            CatalogError::Parse(e.to_string())
        })?;

        // Some catalog backends answer 200 with `null` or `{}` for unknown ids
        if is_empty_document(&value) {
            return Err(CatalogError::NotFound(path.to_string()));
        }

        serde_json::from_value(value).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

fn is_empty_document(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[async_trait::async_trait]
impl StockService for CatalogClient {
    #[instrument(skip(self))]
    async fn stock(&self, product_id: ProductId) -> Result<StockRecord, CatalogError> {
        let stock: StockRecord = self.get_json(&format!("stock/{product_id}")).await?;
        debug!(amount = stock.amount, "Fetched stock");
        Ok(stock)
    }

    #[instrument(skip(self))]
    async fn product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        if let Some(cache) = &self.inner.products
            && let Some(product) = cache.get(&product_id).await
        {
            debug!("Product cache hit");
            return Ok(product);
        }

        let product: Product = self.get_json(&format!("products/{product_id}")).await?;

        if let Some(cache) = &self.inner.products {
            cache.insert(product_id, product.clone()).await;
        }

        Ok(product)
    }
}
