//! Optimistic favorite flag.
//!
//! Same contract as the basket commands, for a single boolean per product:
//! flip the local flag, write it to the store, flip it back on failure.

use std::collections::HashMap;
use std::sync::Arc;

use basket_core::{Product, ProductId};
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::error::{BasketError, CommandKind, Result};
use crate::remote::RemoteStore;

/// Local favorite flags, keyed by product.
pub type FavoriteFlags = HashMap<ProductId, bool>;

/// Toggles product favorite flags with local-first updates.
pub struct FavoriteToggle<S> {
    store: Arc<S>,
    flags: watch::Sender<FavoriteFlags>,
}

impl<S: RemoteStore> FavoriteToggle<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let (flags, _) = watch::channel(FavoriteFlags::new());
        Self { store, flags }
    }

    /// Record the flag of a product the caller already loaded.
    pub fn track(&self, product: &Product) {
        self.set_local(&product.id, product.favorite);
    }

    /// Current local flag, if the product has been seen.
    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> Option<bool> {
        self.flags.borrow().get(product_id).copied()
    }

    /// Receiver that observes every flag change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FavoriteFlags> {
        self.flags.subscribe()
    }

    /// Flip the product's favorite flag and return the new value.
    ///
    /// A product that was never tracked is read from the catalog first.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::RemoteCall`] if the lookup or the write fails;
    /// the local flag is back at its previous value by then.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle(&self, product_id: &ProductId) -> Result<bool> {
        let previous = match self.is_favorite(product_id) {
            Some(flag) => flag,
            None => {
                let product = self
                    .store
                    .get_product(product_id)
                    .await
                    .map_err(|source| BasketError::RemoteCall {
                        command: CommandKind::ToggleFavorite,
                        source,
                    })?;
                product.favorite
            }
        };

        let next = !previous;
        self.set_local(product_id, next);

        if let Err(source) = self.store.set_product_favorite(product_id, next).await {
            warn!(error = %source, "Favorite update failed, restoring flag");
            self.set_local(product_id, previous);
            return Err(BasketError::RemoteCall {
                command: CommandKind::ToggleFavorite,
                source,
            });
        }

        Ok(next)
    }

    fn set_local(&self, product_id: &ProductId, flag: bool) {
        self.flags.send_modify(|flags| {
            flags.insert(product_id.clone(), flag);
        });
    }
}
