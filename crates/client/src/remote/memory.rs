//! In-memory remote store.
//!
//! Behaves like the HTTP store (ids are assigned by the store, no uniqueness
//! is enforced on `(owner, product)`) and adds hooks for exercising failure
//! paths:
//!
//! - [`InMemoryStore::fail_next`] / [`InMemoryStore::fail_always`] make calls
//!   to one operation fail with [`RemoteError::Unavailable`]
//! - [`InMemoryStore::hold_next`] parks the next call to an operation until
//!   the returned [`CallGate`] is released, so two in-flight commands can be
//!   completed in a chosen order
//! - [`InMemoryStore::calls`] records every call in arrival order

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use basket_core::{
    LineItem, LineItemId, Notification, Order, OrderId, OrderRequest, OwnerId, Product, ProductId,
};
use tokio::sync::oneshot;

use super::{NewLineItem, RemoteError, RemoteStore};

/// Operations of the [`RemoteStore`] contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListLineItems,
    CreateLineItem,
    UpdateLineItemQuantity,
    DeleteLineItem,
    GetProduct,
    SetProductFavorite,
    CreateOrder,
    CreateNotification,
}

/// Holds one parked call until released or dropped.
#[derive(Debug)]
pub struct CallGate {
    release: oneshot::Sender<()>,
}

impl CallGate {
    /// Let the parked call proceed.
    pub fn release(self) {
        // The call may have been abandoned; nothing to wake then.
        let _ = self.release.send(());
    }
}

#[derive(Default)]
struct StoreState {
    line_items: Vec<LineItem>,
    products: HashMap<ProductId, Product>,
    orders: Vec<Order>,
    notifications: Vec<Notification>,
    calls: Vec<StoreOp>,
    fail_next: HashMap<StoreOp, usize>,
    fail_always: HashSet<StoreOp>,
    gates: HashMap<StoreOp, VecDeque<oneshot::Receiver<()>>>,
}

/// Process-local [`RemoteStore`].
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Seeding & inspection
    // =========================================================================

    /// Add or replace a catalog product.
    pub fn insert_product(&self, product: Product) {
        self.state().products.insert(product.id.clone(), product);
    }

    /// Persist a line item directly, assigning an id if it has none.
    pub fn insert_line_item(&self, mut item: LineItem) -> LineItem {
        if item.id.is_none() {
            item.id = Some(LineItemId::generate());
        }
        self.state().line_items.push(item.clone());
        item
    }

    /// Stored line items for an owner.
    #[must_use]
    pub fn line_items(&self, owner_id: &OwnerId) -> Vec<LineItem> {
        self.state()
            .line_items
            .iter()
            .filter(|item| &item.owner_id == owner_id)
            .cloned()
            .collect()
    }

    /// Stored copy of a product.
    #[must_use]
    pub fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.state().products.get(product_id).cloned()
    }

    /// Orders created so far.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.clone()
    }

    /// Notifications created so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    /// Every call received, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreOp> {
        self.state().calls.clone()
    }

    /// Number of calls received for one operation.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state().calls.iter().filter(|&&call| call == op).count()
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Fail the next call to `op`. Repeated calls stack up.
    pub fn fail_next(&self, op: StoreOp) {
        *self.state().fail_next.entry(op).or_insert(0) += 1;
    }

    /// Fail every call to `op` until [`InMemoryStore::recover`].
    pub fn fail_always(&self, op: StoreOp) {
        self.state().fail_always.insert(op);
    }

    /// Stop failing `op`.
    pub fn recover(&self, op: StoreOp) {
        let mut state = self.state();
        state.fail_always.remove(&op);
        state.fail_next.remove(&op);
    }

    /// Park the next call to `op` until the gate is released.
    #[must_use]
    pub fn hold_next(&self, op: StoreOp) -> CallGate {
        let (release, parked) = oneshot::channel();
        self.state().gates.entry(op).or_default().push_back(parked);
        CallGate { release }
    }

    /// Record the call, wait on any gate, then decide whether it fails.
    async fn enter(&self, op: StoreOp) -> Result<(), RemoteError> {
        let gate = {
            let mut state = self.state();
            state.calls.push(op);
            state.gates.get_mut(&op).and_then(VecDeque::pop_front)
        };

        if let Some(parked) = gate {
            // A dropped gate counts as released.
            let _ = parked.await;
        }

        let mut state = self.state();
        if state.fail_always.contains(&op) {
            return Err(injected(op));
        }
        if let Some(remaining) = state.fail_next.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(injected(op));
        }
        Ok(())
    }
}

fn injected(op: StoreOp) -> RemoteError {
    RemoteError::Unavailable(format!("injected failure: {op:?}"))
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn list_line_items(&self, owner_id: &OwnerId) -> Result<Vec<LineItem>, RemoteError> {
        self.enter(StoreOp::ListLineItems).await?;
        Ok(self.line_items(owner_id))
    }

    async fn create_line_item(&self, item: NewLineItem) -> Result<LineItem, RemoteError> {
        self.enter(StoreOp::CreateLineItem).await?;
        let record = LineItem {
            id: Some(LineItemId::generate()),
            ..LineItem::pending(item.owner_id, item.product_id, item.quantity, item.unit_price)
        };
        self.state().line_items.push(record.clone());
        Ok(record)
    }

    async fn update_line_item_quantity(
        &self,
        id: &LineItemId,
        quantity: u32,
    ) -> Result<LineItem, RemoteError> {
        self.enter(StoreOp::UpdateLineItemQuantity).await?;
        let mut state = self.state();
        let record = state
            .line_items
            .iter_mut()
            .find(|item| item.has_id(id))
            .ok_or_else(|| RemoteError::NotFound(format!("line item {id}")))?;
        record.quantity = quantity;
        Ok(record.clone())
    }

    async fn delete_line_item(&self, id: &LineItemId) -> Result<(), RemoteError> {
        self.enter(StoreOp::DeleteLineItem).await?;
        let mut state = self.state();
        let before = state.line_items.len();
        state.line_items.retain(|item| !item.has_id(id));
        if state.line_items.len() == before {
            return Err(RemoteError::NotFound(format!("line item {id}")));
        }
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Product, RemoteError> {
        self.enter(StoreOp::GetProduct).await?;
        self.product(product_id)
            .ok_or_else(|| RemoteError::NotFound(format!("product {product_id}")))
    }

    async fn set_product_favorite(
        &self,
        product_id: &ProductId,
        favorite: bool,
    ) -> Result<(), RemoteError> {
        self.enter(StoreOp::SetProductFavorite).await?;
        let mut state = self.state();
        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| RemoteError::NotFound(format!("product {product_id}")))?;
        product.favorite = favorite;
        Ok(())
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order, RemoteError> {
        self.enter(StoreOp::CreateOrder).await?;
        let order = Order::from_request(OrderId::generate(), request);
        self.state().orders.push(order.clone());
        Ok(order)
    }

    async fn create_notification(&self, notification: Notification) -> Result<(), RemoteError> {
        self.enter(StoreOp::CreateNotification).await?;
        self.state().notifications.push(notification);
        Ok(())
    }
}
