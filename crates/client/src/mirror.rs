//! In-memory mirror of the owner's remote basket.
//!
//! The mirror is the ground truth for display between synchronization
//! points. Readers get immutable [`CartSnapshot`]s, either on demand or
//! pushed through a `watch` channel. Writes are crate-private so that every
//! mutation goes through the sync engine and the merge policy.

use std::sync::{Mutex, MutexGuard, PoisonError};

use basket_core::{LineItem, LineItemId, Price, ProductId};
use tokio::sync::watch;

/// Immutable view of the basket at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSnapshot {
    items: Vec<LineItem>,
    total: Price,
    item_count: u32,
}

impl CartSnapshot {
    /// Build a snapshot, deriving the total and item count.
    #[must_use]
    pub fn from_items(items: Vec<LineItem>) -> Self {
        let total = items.iter().map(LineItem::line_total).sum();
        let item_count = items
            .iter()
            .fold(0_u32, |count, item| count.saturating_add(item.quantity));
        Self {
            items,
            total,
            item_count,
        }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Σ(quantity × unit price).
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }

    /// Σ quantity.
    #[must_use]
    pub const fn item_count(&self) -> u32 {
        self.item_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Line item with the given remote id.
    #[must_use]
    pub fn find(&self, id: &LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.has_id(id))
    }

    /// Line item for the given product.
    #[must_use]
    pub fn find_product(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    pub(crate) fn into_items(self) -> Vec<LineItem> {
        self.items
    }
}

/// Ordered collection of the current owner's line items.
pub struct LineItemMirror {
    items: Mutex<Vec<LineItem>>,
    published: watch::Sender<CartSnapshot>,
}

impl Default for LineItemMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl LineItemMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        let (published, _) = watch::channel(CartSnapshot::default());
        Self {
            items: Mutex::new(Vec::new()),
            published,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LineItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current items and total.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.published.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.published.subscribe()
    }

    /// Swap the whole collection at once.
    pub fn replace(&self, items: Vec<LineItem>) {
        let mut current = self.lock();
        *current = items;
        self.publish(&current);
    }

    /// Apply `f` to the items and publish the result as one step.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<LineItem>) -> R) -> R {
        let mut current = self.lock();
        let result = f(&mut current);
        self.publish(&current);
        result
    }

    // Called with the item lock held so snapshots are published in mutation order.
    fn publish(&self, items: &[LineItem]) {
        self.published
            .send_replace(CartSnapshot::from_items(items.to_vec()));
    }
}
