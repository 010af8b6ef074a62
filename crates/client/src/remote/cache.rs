//! Product cache for catalog lookups.

use basket_core::{Product, ProductId};
use moka::future::Cache;

use crate::config::RemoteStoreConfig;

/// Catalog products keyed by id.
///
/// Line items are never cached: they are mutable basket state and must always
/// reflect the store.
#[derive(Clone)]
pub struct ProductCache {
    cache: Cache<ProductId, Product>,
}

impl ProductCache {
    pub fn new(config: &RemoteStoreConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.product_cache_capacity)
                .time_to_live(config.product_cache_ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: &ProductId) -> Option<Product> {
        self.cache.get(id).await
    }

    pub async fn insert(&self, product: Product) {
        self.cache.insert(product.id.clone(), product).await;
    }

    pub async fn invalidate(&self, id: &ProductId) {
        self.cache.invalidate(id).await;
    }
}
