//! Remote store adapters.
//!
//! # Architecture
//!
//! - [`RemoteStore`] is the only seam between the basket and the backend
//! - Every method is one request/response round-trip with no transaction
//!   spanning calls
//! - Timeouts belong to the adapter; callers treat every failure the same
//!
//! # Adapters
//!
//! - [`HttpRemoteStore`] - JSON over HTTP with a cached product catalog
//! - [`InMemoryStore`] - process-local store with failure injection, used by
//!   tests and demos

mod cache;
mod http;
pub mod memory;

pub use http::HttpRemoteStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use basket_core::{
    LineItem, LineItemId, Notification, Order, OrderRequest, OwnerId, Price, Product, ProductId,
};
use thiserror::Error;

/// Errors that can occur when talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code returned.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the store.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Store could not serve the request.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Line item payload for [`RemoteStore::create_line_item`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NewLineItem {
    pub owner_id: OwnerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Price,
}

/// CRUD access to the backend's line item, catalog and order collections.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All line items belonging to `owner_id`.
    async fn list_line_items(&self, owner_id: &OwnerId) -> Result<Vec<LineItem>, RemoteError>;

    /// Persist a new line item and return the stored record.
    async fn create_line_item(&self, item: NewLineItem) -> Result<LineItem, RemoteError>;

    /// Set the quantity of an existing line item and return the stored record.
    async fn update_line_item_quantity(
        &self,
        id: &LineItemId,
        quantity: u32,
    ) -> Result<LineItem, RemoteError>;

    /// Delete a line item.
    async fn delete_line_item(&self, id: &LineItemId) -> Result<(), RemoteError>;

    /// Look up a catalog product.
    async fn get_product(&self, product_id: &ProductId) -> Result<Product, RemoteError>;

    /// Write a product's favorite flag.
    async fn set_product_favorite(
        &self,
        product_id: &ProductId,
        favorite: bool,
    ) -> Result<(), RemoteError>;

    /// Persist an order.
    async fn create_order(&self, request: OrderRequest) -> Result<Order, RemoteError>;

    /// Record a notification for the store's back office.
    async fn create_notification(&self, notification: Notification) -> Result<(), RemoteError>;
}
