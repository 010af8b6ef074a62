//! Optimistic sync engine.
//!
//! Every cart command follows the same three steps:
//!
//! 1. Capture the current snapshot.
//! 2. Apply the change to the mirror, synchronously.
//! 3. Call the remote store. On failure restore the captured snapshot and
//!    report the error; on success keep the optimistic state, overwritten by
//!    the store's echoed record when it returns one.
//!
//! Every failed command also reloads the whole basket afterwards, because
//! other commands may have completed while it was in flight and the restored
//! snapshot can be stale.
//!
//! An add that merges into a line item whose create is still in flight makes
//! no call of its own. It joins that create and returns once the merged
//! quantity is on the store, or fails with it.
//!
//! Two quantity updates on the same line item can still complete out of
//! order at the store. The last echo to arrive wins locally; the mirror, not
//! the individual call results, is the ground truth for callers.

use std::sync::Arc;

use basket_core::{LineItem, LineItemId, OwnerId, Price, Product, ProductId};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{BasketError, CommandKind, Result};
use crate::merge::{MergeOutcome, MergePolicy};
use crate::mirror::{CartSnapshot, LineItemMirror};
use crate::pending::{self, CreateOutcome, CreateTicket, PendingCreates};
use crate::remote::{NewLineItem, RemoteError, RemoteStore};

/// A local change whose remote confirmation is outstanding.
struct InFlight<'a> {
    mirror: &'a LineItemMirror,
    command: CommandKind,
    before: CartSnapshot,
}

impl<'a> InFlight<'a> {
    fn begin(mirror: &'a LineItemMirror, command: CommandKind) -> Self {
        Self {
            mirror,
            command,
            before: mirror.snapshot(),
        }
    }

    /// Restore the captured snapshot and turn the failure into a command error.
    fn rollback(self, source: RemoteError) -> BasketError {
        warn!(command = %self.command, error = %source, "Remote call failed, restoring basket");
        self.mirror.replace(self.before.into_items());
        BasketError::RemoteCall {
            command: self.command,
            source,
        }
    }
}

/// What an add still has to do once its local merge is applied.
enum AddStep<'a> {
    Create(CreateTicket<'a>),
    Update { id: LineItemId, quantity: u32 },
    Join(watch::Receiver<CreateOutcome>),
    /// Merged into a pending line item that no create owns any more.
    Orphaned,
}

/// Owns the basket mirror and keeps it in step with the remote store.
pub struct SyncEngine<S> {
    owner_id: OwnerId,
    store: Arc<S>,
    mirror: LineItemMirror,
    pending: PendingCreates,
}

impl<S: RemoteStore> SyncEngine<S> {
    /// Create an engine with an empty mirror. Call [`SyncEngine::reload`] to
    /// populate it.
    #[must_use]
    pub fn new(owner_id: OwnerId, store: Arc<S>) -> Self {
        Self {
            owner_id,
            store,
            mirror: LineItemMirror::new(),
            pending: PendingCreates::default(),
        }
    }

    #[must_use]
    pub const fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.mirror.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.mirror.subscribe()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Add `quantity` units of a product at `unit_price`.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::RemoteCall`] if the store rejects the create or
    /// update, or if the create this add merged into fails. The mirror is
    /// restored and reloaded first.
    pub async fn add(
        &self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Price,
    ) -> Result<CartSnapshot> {
        let incoming = LineItem::pending(self.owner_id.clone(), product_id, quantity, unit_price);
        self.add_line(incoming).await
    }

    /// Add a catalog product, carrying its title and image into the mirror.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::add`].
    pub async fn add_product(&self, product: &Product, quantity: u32) -> Result<CartSnapshot> {
        let incoming = LineItem {
            display_name: product.name.clone(),
            display_image: product.image.clone(),
            ..LineItem::pending(
                self.owner_id.clone(),
                product.id.clone(),
                quantity,
                product.price,
            )
        };
        self.add_line(incoming).await
    }

    #[instrument(
        skip(self, incoming),
        fields(
            owner_id = %self.owner_id,
            product_id = %incoming.product_id,
            quantity = incoming.quantity
        )
    )]
    async fn add_line(&self, incoming: LineItem) -> Result<CartSnapshot> {
        if incoming.quantity == 0 {
            debug!("Ignoring add of zero quantity");
            return Ok(self.snapshot());
        }

        let template = incoming.clone();
        let (in_flight, step) = {
            let mut pending = self.pending.lock();
            let in_flight = InFlight::begin(&self.mirror, CommandKind::Add);
            let outcome = self
                .mirror
                .mutate(|items| MergePolicy::apply(items, incoming));
            let step = match outcome {
                MergeOutcome::Inserted => AddStep::Create(self.pending.open(
                    &mut pending,
                    template.product_id.clone(),
                    template.quantity,
                )),
                MergeOutcome::Merged {
                    line_item_id: Some(id),
                    quantity,
                    ..
                } => AddStep::Update { id, quantity },
                MergeOutcome::Merged {
                    line_item_id: None,
                    quantity,
                    ..
                } => PendingCreates::join(&mut pending, &template.product_id, quantity)
                    .map_or(AddStep::Orphaned, AddStep::Join),
            };
            (in_flight, step)
        };

        match step {
            AddStep::Create(ticket) => self.create(&template, in_flight, ticket).await?,
            AddStep::Update { id, quantity } => {
                match self.store.update_line_item_quantity(&id, quantity).await {
                    Ok(record) => self.accept_echo(&record),
                    Err(source) => return Err(self.fail(in_flight, source).await),
                }
            }
            AddStep::Join(outcome) => {
                debug!("Merged into line item whose create is in flight");
                if let CreateOutcome::Failed(reason) = pending::wait(outcome).await {
                    warn!(%reason, "Line item create failed, merged quantity not persisted");
                    self.resync().await;
                    return Err(BasketError::RemoteCall {
                        command: CommandKind::Add,
                        source: RemoteError::Unavailable(reason),
                    });
                }
            }
            AddStep::Orphaned => {
                let source = RemoteError::Unavailable(
                    "pending line item has no create in flight".to_string(),
                );
                return Err(self.fail(in_flight, source).await);
            }
        }

        Ok(self.snapshot())
    }

    /// Create the line item `template` inserted, then settle every add that
    /// joined the create meanwhile.
    async fn create(
        &self,
        template: &LineItem,
        in_flight: InFlight<'_>,
        ticket: CreateTicket<'_>,
    ) -> Result<()> {
        let new_line = NewLineItem {
            owner_id: template.owner_id.clone(),
            product_id: template.product_id.clone(),
            quantity: template.quantity,
            unit_price: template.unit_price,
        };

        let record = match self.store.create_line_item(new_line).await {
            Ok(record) => record,
            Err(source) => {
                let reason = source.to_string();
                let err = {
                    let mut pending = self.pending.lock();
                    ticket.close(&mut pending);
                    in_flight.rollback(source)
                };
                self.resync().await;
                ticket.finish(CreateOutcome::Failed(reason));
                return Err(err);
            }
        };

        let outcome = self.settle_created(record, template, &ticket).await;
        ticket.finish(outcome);
        Ok(())
    }

    /// Roll back a failed add and reload the basket.
    async fn fail(&self, in_flight: InFlight<'_>, source: RemoteError) -> BasketError {
        let err = in_flight.rollback(source);
        self.resync().await;
        err
    }

    /// Set a line item's quantity.
    ///
    /// A quantity of zero is a no-op: removing an item is an explicit
    /// [`SyncEngine::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::LineItemNotFound`] for an unknown id, or
    /// [`BasketError::RemoteCall`] after restoring the previous quantity and
    /// reloading the basket.
    #[instrument(skip(self), fields(owner_id = %self.owner_id, line_item_id = %id))]
    pub async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<CartSnapshot> {
        if quantity == 0 {
            debug!("Ignoring quantity below 1");
            return Ok(self.snapshot());
        }

        let current = self.snapshot();
        let existing = current
            .find(id)
            .ok_or_else(|| BasketError::LineItemNotFound(id.clone()))?;
        if existing.quantity == quantity {
            return Ok(current);
        }

        let in_flight = InFlight::begin(&self.mirror, CommandKind::UpdateQuantity);
        self.mirror.mutate(|items| {
            if let Some(item) = items.iter_mut().find(|item| item.has_id(id)) {
                item.quantity = quantity;
            }
        });

        match self.store.update_line_item_quantity(id, quantity).await {
            Ok(record) => self.accept_echo(&record),
            Err(source) => {
                let err = in_flight.rollback(source);
                self.resync().await;
                return Err(err);
            }
        }

        Ok(self.snapshot())
    }

    /// Raise a line item's quantity by one.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::update_quantity`].
    pub async fn increment(&self, id: &LineItemId) -> Result<CartSnapshot> {
        let quantity = self.current_quantity(id)?;
        self.update_quantity(id, quantity.saturating_add(1)).await
    }

    /// Lower a line item's quantity by one. No-op at quantity 1.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::update_quantity`].
    pub async fn decrement(&self, id: &LineItemId) -> Result<CartSnapshot> {
        let quantity = self.current_quantity(id)?;
        if quantity <= 1 {
            debug!(line_item_id = %id, "Decrement at minimum quantity ignored");
            return Ok(self.snapshot());
        }
        self.update_quantity(id, quantity - 1).await
    }

    /// Remove a line item.
    ///
    /// The item leaves the mirror before the delete is sent.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::LineItemNotFound`] for an unknown id, or
    /// [`BasketError::RemoteCall`] after reloading the basket from the store.
    #[instrument(skip(self), fields(owner_id = %self.owner_id, line_item_id = %id))]
    pub async fn remove(&self, id: &LineItemId) -> Result<CartSnapshot> {
        if self.snapshot().find(id).is_none() {
            return Err(BasketError::LineItemNotFound(id.clone()));
        }

        self.mirror.mutate(|items| items.retain(|item| !item.has_id(id)));

        if let Err(source) = self.store.delete_line_item(id).await {
            warn!(error = %source, "Remote delete failed, reloading basket");
            self.resync().await;
            return Err(BasketError::RemoteCall {
                command: CommandKind::Remove,
                source,
            });
        }

        Ok(self.snapshot())
    }

    /// Replace the mirror with the store's line items, enriched with product
    /// titles and images.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::Load`] if listing line items or fetching any
    /// product fails. The mirror is left unchanged.
    #[instrument(skip(self), fields(owner_id = %self.owner_id))]
    pub async fn reload(&self) -> Result<CartSnapshot> {
        let records = self
            .store
            .list_line_items(&self.owner_id)
            .await
            .map_err(BasketError::Load)?;

        let records = MergePolicy::dedupe(records);
        let mut items = Vec::with_capacity(records.len());
        for mut item in records {
            let product = self
                .store
                .get_product(&item.product_id)
                .await
                .map_err(BasketError::Load)?;
            item.display_name = product.name;
            item.display_image = product.image;
            items.push(item);
        }

        info!(line_items = items.len(), "Basket reloaded");
        self.mirror.replace(items);
        Ok(self.snapshot())
    }

    /// Empty the mirror without touching the store.
    pub(crate) fn clear_local(&self) {
        self.mirror.replace(Vec::new());
    }

    // =========================================================================
    // Reconciliation helpers
    // =========================================================================

    fn current_quantity(&self, id: &LineItemId) -> Result<u32> {
        self.snapshot()
            .find(id)
            .map(|item| item.quantity)
            .ok_or_else(|| BasketError::LineItemNotFound(id.clone()))
    }

    /// Overwrite the matching line item with the store's echoed record.
    fn accept_echo(&self, record: &LineItem) {
        let Some(id) = record.id.as_ref() else {
            return;
        };
        self.mirror.mutate(|items| {
            if let Some(item) = items.iter_mut().find(|item| item.has_id(id)) {
                item.quantity = record.quantity;
                item.unit_price = record.unit_price;
            }
        });
    }

    /// Attach the store-assigned id to the created line item, then push any
    /// quantity merged into it while the create was in flight.
    ///
    /// The outcome is what joined adds observe. The add that issued the
    /// create succeeds regardless, since its own quantity is on the store.
    async fn settle_created(
        &self,
        record: LineItem,
        template: &LineItem,
        ticket: &CreateTicket<'_>,
    ) -> CreateOutcome {
        let Some(id) = record.id.clone() else {
            warn!(product_id = %record.product_id, "Store created a line item without an id");
            self.resync().await;
            return CreateOutcome::Failed("store returned a line item without an id".to_string());
        };

        let attached = {
            let mut pending = self.pending.lock();
            ticket.close(&mut pending).map(|target| {
                let found = self
                    .mirror
                    .mutate(|items| attach_created(items, &record, &id, template, target));
                (target, found)
            })
        };

        let target = match attached {
            Some((target, true)) => target,
            Some((_, false)) | None => {
                warn!(line_item_id = %id, "Created line item no longer fits the basket, reloading");
                self.resync().await;
                return CreateOutcome::Failed(
                    "line item was replaced while its create was in flight".to_string(),
                );
            }
        };

        if target == record.quantity {
            debug!(line_item_id = %id, "Created line item settled");
            return CreateOutcome::Settled;
        }

        debug!(line_item_id = %id, quantity = target, "Pushing quantity merged during create");
        match self.store.update_line_item_quantity(&id, target).await {
            Ok(echo) => {
                self.accept_echo(&echo);
                CreateOutcome::Settled
            }
            Err(source) => {
                warn!(error = %source, "Follow-up quantity update failed, reloading basket");
                self.resync().await;
                CreateOutcome::Failed(source.to_string())
            }
        }
    }

    /// Best-effort reload after a failed command.
    async fn resync(&self) {
        if let Err(e) = self.reload().await {
            warn!(error = %e, "Reload after failed command did not complete");
        }
    }
}

/// Give the created record its place in the mirror at the quantity requested
/// so far. Returns `false` if another record for the product is already there.
fn attach_created(
    items: &mut Vec<LineItem>,
    record: &LineItem,
    id: &LineItemId,
    template: &LineItem,
    target: u32,
) -> bool {
    // A reload may already have picked up the record.
    if let Some(item) = items.iter_mut().find(|item| item.has_id(id)) {
        item.quantity = target;
        return true;
    }
    if let Some(item) = items
        .iter_mut()
        .find(|item| item.product_id == record.product_id && item.is_pending())
    {
        item.id = Some(id.clone());
        item.unit_price = record.unit_price;
        item.quantity = target;
        return true;
    }
    if items.iter().any(|item| item.product_id == record.product_id) {
        return false;
    }
    // A rollback or reload dropped the pending item; the record exists anyway.
    items.push(LineItem {
        id: Some(id.clone()),
        quantity: target,
        display_name: template.display_name.clone(),
        display_image: template.display_image.clone(),
        ..record.clone()
    });
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::memory::{InMemoryStore, StoreOp};

    fn product(id: &str, price: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            image: Some(format!("https://img.test/{id}.png")),
            price: Price::from_units(price),
            favorite: false,
        }
    }

    fn engine() -> (Arc<InMemoryStore>, SyncEngine<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(product("P1", 10));
        store.insert_product(product("P2", 4));
        let engine = SyncEngine::new(OwnerId::new("u1"), Arc::clone(&store));
        (store, engine)
    }

    fn only_id(snapshot: &CartSnapshot) -> LineItemId {
        snapshot.items().first().and_then(|item| item.id.clone()).unwrap()
    }

    async fn add_p1(engine: &SyncEngine<InMemoryStore>, quantity: u32) -> LineItemId {
        let snapshot = engine
            .add(ProductId::new("P1"), quantity, Price::from_units(10))
            .await
            .unwrap();
        only_id(&snapshot)
    }

    fn p1_quantity(engine: &SyncEngine<InMemoryStore>) -> Option<u32> {
        engine
            .snapshot()
            .find_product(&ProductId::new("P1"))
            .map(|item| item.quantity)
    }

    fn stored_quantity(store: &InMemoryStore, id: &LineItemId) -> Option<u32> {
        store
            .line_items(&OwnerId::new("u1"))
            .iter()
            .find(|item| item.has_id(id))
            .map(|item| item.quantity)
    }

    /// Yield to the other joined futures until `ready` holds.
    async fn until(ready: impl Fn() -> bool) {
        while !ready() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_add_creates_remote_line_item() {
        let (store, engine) = engine();
        let snapshot = engine.add(ProductId::new("P1"), 2, Price::from_units(10)).await.unwrap();

        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.total(), Price::from_units(20));
        assert!(!snapshot.items().first().unwrap().is_pending());
        assert_eq!(store.line_items(&OwnerId::new("u1")).len(), 1);
    }

    #[tokio::test]
    async fn test_add_same_product_merges() {
        let (store, engine) = engine();
        engine.add(ProductId::new("P1"), 2, Price::from_units(10)).await.unwrap();
        let snapshot = engine.add(ProductId::new("P1"), 3, Price::from_units(10)).await.unwrap();

        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.items().first().unwrap().quantity, 5);
        assert_eq!(snapshot.total(), Price::from_units(50));
        assert_eq!(store.call_count(StoreOp::CreateLineItem), 1);
        assert_eq!(store.call_count(StoreOp::UpdateLineItemQuantity), 1);
    }

    #[tokio::test]
    async fn test_add_failure_rolls_back_insert() {
        let (store, engine) = engine();
        store.fail_next(StoreOp::CreateLineItem);

        let result = engine.add(ProductId::new("P1"), 2, Price::from_units(10)).await;
        assert!(matches!(
            result,
            Err(BasketError::RemoteCall { command: CommandKind::Add, .. })
        ));
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_failure_rolls_back_merge() {
        let (store, engine) = engine();
        engine.add(ProductId::new("P1"), 2, Price::from_units(10)).await.unwrap();
        store.fail_next(StoreOp::UpdateLineItemQuantity);

        assert!(engine.add(ProductId::new("P1"), 3, Price::from_units(10)).await.is_err());
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.items().first().unwrap().quantity, 2);
        assert_eq!(snapshot.total(), Price::from_units(20));
    }

    #[tokio::test]
    async fn test_add_zero_quantity_is_noop() {
        let (store, engine) = engine();
        let snapshot = engine.add(ProductId::new("P1"), 0, Price::from_units(10)).await.unwrap();
        assert!(snapshot.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_product_keeps_display_fields() {
        let (_store, engine) = engine();
        let snapshot = engine.add_product(&product("P2", 4), 1).await.unwrap();
        let item = snapshot.items().first().unwrap();
        assert_eq!(item.display_name, "Product P2");
        assert_eq!(item.unit_price, Price::from_units(4));
    }

    #[tokio::test]
    async fn test_update_quantity_success() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 2).await;

        let snapshot = engine.update_quantity(&id, 4).await.unwrap();
        assert_eq!(snapshot.total(), Price::from_units(40));
        assert_eq!(store.line_items(&OwnerId::new("u1")).first().unwrap().quantity, 4);
    }

    #[tokio::test]
    async fn test_update_quantity_failure_restores_and_reloads() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 2).await;
        store.fail_next(StoreOp::UpdateLineItemQuantity);

        let result = engine.update_quantity(&id, 5).await;
        assert!(matches!(
            result,
            Err(BasketError::RemoteCall { command: CommandKind::UpdateQuantity, .. })
        ));
        assert_eq!(engine.snapshot().find(&id).unwrap().quantity, 2);
        assert_eq!(store.call_count(StoreOp::ListLineItems), 1);
    }

    #[tokio::test]
    async fn test_update_quantity_zero_is_noop() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 2).await;

        let snapshot = engine.update_quantity(&id, 0).await.unwrap();
        assert_eq!(snapshot.find(&id).unwrap().quantity, 2);
        assert_eq!(store.call_count(StoreOp::UpdateLineItemQuantity), 0);
    }

    #[tokio::test]
    async fn test_update_unknown_line_item() {
        let (_store, engine) = engine();
        let result = engine.update_quantity(&LineItemId::new("nope"), 3).await;
        assert!(matches!(result, Err(BasketError::LineItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_decrement_at_one_is_noop() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 1).await;

        let snapshot = engine.decrement(&id).await.unwrap();
        assert_eq!(snapshot.find(&id).unwrap().quantity, 1);
        assert_eq!(store.call_count(StoreOp::UpdateLineItemQuantity), 0);

        let snapshot = engine.increment(&id).await.unwrap();
        assert_eq!(snapshot.find(&id).unwrap().quantity, 2);
        let snapshot = engine.decrement(&id).await.unwrap();
        assert_eq!(snapshot.find(&id).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_remove_last_item_leaves_empty_basket() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 2).await;

        let snapshot = engine.remove(&id).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total(), Price::ZERO);
        assert!(store.line_items(&OwnerId::new("u1")).is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_reloads_from_store() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 2).await;
        store.fail_next(StoreOp::DeleteLineItem);

        let result = engine.remove(&id).await;
        assert!(matches!(
            result,
            Err(BasketError::RemoteCall { command: CommandKind::Remove, .. })
        ));
        // The store still has the item, so the reload brings it back.
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.find(&id).unwrap().display_name, "Product P1");
    }

    #[tokio::test]
    async fn test_reload_enriches_display_fields() {
        let (store, engine) = engine();
        store.insert_line_item(LineItem::pending(
            OwnerId::new("u1"),
            ProductId::new("P2"),
            3,
            Price::from_units(4),
        ));

        let snapshot = engine.reload().await.unwrap();
        let item = snapshot.items().first().unwrap();
        assert_eq!(item.display_name, "Product P2");
        assert_eq!(item.display_image.as_deref(), Some("https://img.test/P2.png"));
        assert_eq!(snapshot.total(), Price::from_units(12));
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_mirror() {
        let (store, engine) = engine();
        engine.add(ProductId::new("P1"), 2, Price::from_units(10)).await.unwrap();
        store.fail_next(StoreOp::GetProduct);

        assert!(matches!(engine.reload().await, Err(BasketError::Load(_))));
        assert_eq!(engine.snapshot().total(), Price::from_units(20));

        // Retryable
        assert!(engine.reload().await.is_ok());
    }

    #[tokio::test]
    async fn test_add_during_pending_create_coalesces() {
        let (store, engine) = engine();
        let gate = store.hold_next(StoreOp::CreateLineItem);

        let first = engine.add(ProductId::new("P1"), 2, Price::from_units(10));
        let second = async {
            until(|| store.call_count(StoreOp::CreateLineItem) == 1).await;
            engine.add(ProductId::new("P1"), 3, Price::from_units(10)).await
        };
        let release = async {
            until(|| p1_quantity(&engine) == Some(5)).await;
            gate.release();
        };
        let (first, second, ()) = tokio::join!(first, second, release);
        first.unwrap();
        second.unwrap();

        let stored = store.line_items(&OwnerId::new("u1"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.first().unwrap().quantity, 5);
        assert_eq!(store.call_count(StoreOp::CreateLineItem), 1);
        assert_eq!(p1_quantity(&engine), Some(5));
    }

    #[tokio::test]
    async fn test_failed_create_fails_adds_merged_into_it() {
        let (store, engine) = engine();
        let gate = store.hold_next(StoreOp::CreateLineItem);

        let first = engine.add(ProductId::new("P1"), 2, Price::from_units(10));
        let second = async {
            until(|| store.call_count(StoreOp::CreateLineItem) == 1).await;
            engine.add(ProductId::new("P1"), 3, Price::from_units(10)).await
        };
        let release = async {
            until(|| p1_quantity(&engine) == Some(5)).await;
            store.fail_next(StoreOp::CreateLineItem);
            gate.release();
        };
        let (first, second, ()) = tokio::join!(first, second, release);

        for result in [first, second] {
            assert!(matches!(
                result,
                Err(BasketError::RemoteCall { command: CommandKind::Add, .. })
            ));
        }
        assert!(engine.snapshot().is_empty());
        assert!(store.line_items(&OwnerId::new("u1")).is_empty());
        assert_eq!(store.call_count(StoreOp::UpdateLineItemQuantity), 0);
    }

    #[tokio::test]
    async fn test_failed_follow_up_update_fails_merged_add_only() {
        let (store, engine) = engine();
        let gate = store.hold_next(StoreOp::CreateLineItem);

        let first = engine.add(ProductId::new("P1"), 2, Price::from_units(10));
        let second = async {
            until(|| store.call_count(StoreOp::CreateLineItem) == 1).await;
            engine.add(ProductId::new("P1"), 3, Price::from_units(10)).await
        };
        let release = async {
            until(|| p1_quantity(&engine) == Some(5)).await;
            store.fail_next(StoreOp::UpdateLineItemQuantity);
            gate.release();
        };
        let (first, second, ()) = tokio::join!(first, second, release);

        // The create itself landed, so the add that issued it succeeded.
        first.unwrap();
        assert!(matches!(
            second,
            Err(BasketError::RemoteCall { command: CommandKind::Add, .. })
        ));
        let stored = store.line_items(&OwnerId::new("u1"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.first().unwrap().quantity, 2);
        assert_eq!(p1_quantity(&engine), Some(2));
        assert!(!engine.snapshot().items().first().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_failed_add_reloads_items_added_meanwhile() {
        let (store, engine) = engine();
        let gate = store.hold_next(StoreOp::CreateLineItem);

        let first = engine.add(ProductId::new("P1"), 2, Price::from_units(10));
        let second = async {
            until(|| store.call_count(StoreOp::CreateLineItem) == 1).await;
            let result = engine.add(ProductId::new("P2"), 1, Price::from_units(4)).await;
            store.fail_next(StoreOp::CreateLineItem);
            gate.release();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_err());
        second.unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.items().len(), 1);
        let p2 = snapshot.find_product(&ProductId::new("P2")).unwrap();
        assert!(!p2.is_pending());
        assert_eq!(snapshot.total(), Price::from_units(4));

        // P2 is known locally, so adding it again updates the stored record.
        engine.add(ProductId::new("P2"), 1, Price::from_units(4)).await.unwrap();
        let stored = store.line_items(&OwnerId::new("u1"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.first().unwrap().quantity, 2);
        assert_eq!(store.call_count(StoreOp::CreateLineItem), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_quantity_echoes_last_one_wins() {
        let (store, engine) = engine();
        let id = add_p1(&engine, 1).await;
        let slow = store.hold_next(StoreOp::UpdateLineItemQuantity);
        let fast = store.hold_next(StoreOp::UpdateLineItemQuantity);

        let to_three = engine.update_quantity(&id, 3);
        let to_five = async {
            until(|| store.call_count(StoreOp::UpdateLineItemQuantity) == 1).await;
            engine.update_quantity(&id, 5).await
        };
        let release = async {
            until(|| store.call_count(StoreOp::UpdateLineItemQuantity) == 2).await;
            fast.release();
            until(|| stored_quantity(&store, &id) == Some(5)).await;
            slow.release();
        };
        let (to_three, to_five, ()) = tokio::join!(to_three, to_five, release);
        to_three.unwrap();
        to_five.unwrap();

        // The stale update reached the store last and its echo wins locally.
        assert_eq!(stored_quantity(&store, &id), Some(3));
        assert_eq!(engine.snapshot().find(&id).unwrap().quantity, 3);

        let reloaded = engine.reload().await.unwrap();
        assert_eq!(reloaded.find(&id).unwrap().quantity, 3);
        assert_eq!(reloaded, engine.snapshot());
    }
}
