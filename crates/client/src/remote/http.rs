//! HTTP remote store adapter.
//!
//! Talks JSON to the store API with `reqwest`. Catalog products are cached
//! with `moka`; line items, orders and notifications always hit the network.

use std::sync::Arc;

use async_trait::async_trait;
use basket_core::{
    LineItem, LineItemId, Notification, Order, OrderRequest, OwnerId, Product, ProductId,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use super::cache::ProductCache;
use super::{NewLineItem, RemoteError, RemoteStore};
use crate::config::RemoteStoreConfig;

/// Characters of a failed response body kept in errors and logs.
const ERROR_BODY_LIMIT: usize = 200;

// =============================================================================
// HttpRemoteStore
// =============================================================================

/// Remote store reached over HTTP.
///
/// Cheap to clone; clones share the connection pool and product cache.
#[derive(Clone)]
pub struct HttpRemoteStore {
    inner: Arc<HttpRemoteStoreInner>,
}

struct HttpRemoteStoreInner {
    client: reqwest::Client,
    base_url: Url,
    authorization: String,
    cache: ProductCache,
}

impl HttpRemoteStore {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &RemoteStoreConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpRemoteStoreInner {
                client,
                base_url: config.base_url.clone(),
                authorization: config.bearer(),
                cache: ProductCache::new(config),
            }),
        })
    }

    /// Build an endpoint URL from escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::Unavailable(format!("invalid base URL: {}", self.inner.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("Authorization", &self.inner.authorization)
            .header("Accept", "application/json")
    }

    /// Send a request and return the raw body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        let url = response.url().to_string();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(url));
        }

        if !status.is_success() {
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::error!(
                status = %status,
                url = %url,
                body = %body,
                "Remote store returned non-success status"
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    /// Send a request and parse the JSON response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(ERROR_BODY_LIMIT).collect::<String>(),
                "Failed to parse remote store response"
            );
            RemoteError::Parse(e)
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_line_items(&self, owner_id: &OwnerId) -> Result<Vec<LineItem>, RemoteError> {
        let url = self.endpoint(&["owners", owner_id.as_str(), "line-items"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    async fn create_line_item(&self, item: NewLineItem) -> Result<LineItem, RemoteError> {
        let url = self.endpoint(&["line-items"])?;
        self.send_json(self.request(Method::POST, url).json(&item))
            .await
    }

    #[instrument(skip(self), fields(line_item_id = %id))]
    async fn update_line_item_quantity(
        &self,
        id: &LineItemId,
        quantity: u32,
    ) -> Result<LineItem, RemoteError> {
        let url = self.endpoint(&["line-items", id.as_str()])?;
        self.send_json(
            self.request(Method::PATCH, url)
                .json(&json!({ "quantity": quantity })),
        )
        .await
    }

    #[instrument(skip(self), fields(line_item_id = %id))]
    async fn delete_line_item(&self, id: &LineItemId) -> Result<(), RemoteError> {
        let url = self.endpoint(&["line-items", id.as_str()])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn get_product(&self, product_id: &ProductId) -> Result<Product, RemoteError> {
        if let Some(product) = self.inner.cache.get(product_id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let url = self.endpoint(&["products", product_id.as_str()])?;
        let product: Product = self.send_json(self.request(Method::GET, url)).await?;

        self.inner.cache.insert(product.clone()).await;

        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn set_product_favorite(
        &self,
        product_id: &ProductId,
        favorite: bool,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["products", product_id.as_str()])?;
        let result = self
            .send(
                self.request(Method::PATCH, url)
                    .json(&json!({ "favorite": favorite })),
            )
            .await;

        // The cached copy is stale either way once a write was attempted
        self.inner.cache.invalidate(product_id).await;

        result.map(|_| ())
    }

    #[instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    async fn create_order(&self, request: OrderRequest) -> Result<Order, RemoteError> {
        let url = self.endpoint(&["orders"])?;
        self.send_json(self.request(Method::POST, url).json(&request))
            .await
    }

    #[instrument(skip(self, notification), fields(owner_id = %notification.owner_id))]
    async fn create_notification(&self, notification: Notification) -> Result<(), RemoteError> {
        let url = self.endpoint(&["notifications"])?;
        self.send(self.request(Method::POST, url).json(&notification))
            .await?;
        Ok(())
    }
}
