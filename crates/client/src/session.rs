//! Per-shopper basket session.
//!
//! A [`BasketSession`] is the context object a UI holds for the signed-in
//! shopper: the owner id, the remote store, the sync engine and the favorite
//! flags. It is constructed explicitly and passed around; there is no global
//! basket state.

use std::sync::Arc;

use basket_core::{LineItemId, OwnerId, Price, Product, ProductId, RecipientInfo};
use tokio::sync::watch;

use crate::checkout::{CheckoutCoordinator, CheckoutReceipt};
use crate::config::{BasketConfig, CheckoutConfig};
use crate::error::Result;
use crate::favorite::{FavoriteFlags, FavoriteToggle};
use crate::mirror::CartSnapshot;
use crate::remote::{HttpRemoteStore, RemoteError, RemoteStore};
use crate::sync::SyncEngine;

/// Basket operations for one owner.
pub struct BasketSession<S> {
    engine: SyncEngine<S>,
    favorites: FavoriteToggle<S>,
    checkout: CheckoutConfig,
}

impl BasketSession<HttpRemoteStore> {
    /// Build a session backed by the HTTP store described in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(
        owner_id: OwnerId,
        config: &BasketConfig,
    ) -> std::result::Result<Self, RemoteError> {
        let store = Arc::new(HttpRemoteStore::new(&config.remote)?);
        Ok(Self::new(owner_id, store, config.checkout.clone()))
    }
}

impl<S: RemoteStore> BasketSession<S> {
    #[must_use]
    pub fn new(owner_id: OwnerId, store: Arc<S>, checkout: CheckoutConfig) -> Self {
        Self {
            engine: SyncEngine::new(owner_id, Arc::clone(&store)),
            favorites: FavoriteToggle::new(store),
            checkout,
        }
    }

    #[must_use]
    pub const fn owner_id(&self) -> &OwnerId {
        self.engine.owner_id()
    }

    /// Current basket contents and total.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.engine.snapshot()
    }

    /// Receiver that observes every basket change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.engine.subscribe()
    }

    /// See [`SyncEngine::reload`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::Load`] if the store cannot be read.
    pub async fn reload(&self) -> Result<CartSnapshot> {
        self.engine.reload().await
    }

    /// See [`SyncEngine::add`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::RemoteCall`] after rolling back.
    pub async fn add(
        &self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Price,
    ) -> Result<CartSnapshot> {
        self.engine.add(product_id, quantity, unit_price).await
    }

    /// See [`SyncEngine::add_product`]. Also starts tracking the product's
    /// favorite flag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::RemoteCall`] after rolling back.
    pub async fn add_product(&self, product: &Product, quantity: u32) -> Result<CartSnapshot> {
        self.favorites.track(product);
        self.engine.add_product(product, quantity).await
    }

    /// See [`SyncEngine::update_quantity`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::LineItemNotFound`] or
    /// [`crate::BasketError::RemoteCall`].
    pub async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<CartSnapshot> {
        self.engine.update_quantity(id, quantity).await
    }

    /// See [`SyncEngine::increment`].
    ///
    /// # Errors
    ///
    /// Same as [`BasketSession::update_quantity`].
    pub async fn increment(&self, id: &LineItemId) -> Result<CartSnapshot> {
        self.engine.increment(id).await
    }

    /// See [`SyncEngine::decrement`].
    ///
    /// # Errors
    ///
    /// Same as [`BasketSession::update_quantity`].
    pub async fn decrement(&self, id: &LineItemId) -> Result<CartSnapshot> {
        self.engine.decrement(id).await
    }

    /// See [`SyncEngine::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::LineItemNotFound`] or
    /// [`crate::BasketError::RemoteCall`].
    pub async fn remove(&self, id: &LineItemId) -> Result<CartSnapshot> {
        self.engine.remove(id).await
    }

    /// Place an order for the current basket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::Validation`] or
    /// [`crate::BasketError::OrderCreation`]; see [`CheckoutCoordinator::run`].
    pub async fn checkout(&self, recipient: RecipientInfo) -> Result<CheckoutReceipt> {
        CheckoutCoordinator::new(&self.engine, &self.checkout)
            .run(recipient)
            .await
    }

    /// See [`FavoriteToggle::toggle`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BasketError::RemoteCall`] after restoring the flag.
    pub async fn toggle_favorite(&self, product_id: &ProductId) -> Result<bool> {
        self.favorites.toggle(product_id).await
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> Option<bool> {
        self.favorites.is_favorite(product_id)
    }

    #[must_use]
    pub fn subscribe_favorites(&self) -> watch::Receiver<FavoriteFlags> {
        self.favorites.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::InMemoryStore;

    #[tokio::test]
    async fn test_session_add_then_checkout() {
        let store = Arc::new(InMemoryStore::new());
        let session = BasketSession::new(
            OwnerId::new("u1"),
            Arc::clone(&store),
            CheckoutConfig::default(),
        );
        let product = Product {
            id: ProductId::new("P1"),
            name: "Pineapple".to_string(),
            image: None,
            price: Price::from_units(10),
            favorite: false,
        };
        store.insert_product(product.clone());

        session.add_product(&product, 2).await.unwrap();
        assert_eq!(session.is_favorite(&product.id), Some(false));
        assert_eq!(session.snapshot().total(), Price::from_units(20));

        let receipt = session
            .checkout(RecipientInfo::new("Ada", "1 Loop Rd", "555-0100"))
            .await
            .unwrap();
        assert_eq!(receipt.order.owner_id, OwnerId::new("u1"));
        assert!(session.snapshot().is_empty());
    }
}
