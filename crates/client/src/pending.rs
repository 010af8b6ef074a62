//! Line item creates still waiting on the store.
//!
//! While a create is in flight its line item has no id, so further adds of
//! the same product merge into it locally and join the create here instead
//! of calling the store. The create's owner reports one [`CreateOutcome`]
//! that every joined add waits for.
//!
//! Lock order is registry, then mirror.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use basket_core::ProductId;
use tokio::sync::watch;

/// How a line item create ended, as seen by adds merged into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CreateOutcome {
    InFlight,
    /// The merged quantity is on the store.
    Settled,
    /// The merged quantity was not persisted.
    Failed(String),
}

pub(crate) struct PendingEntry {
    quantity: u32,
    outcome: Arc<watch::Sender<CreateOutcome>>,
}

pub(crate) type PendingEntries = HashMap<ProductId, PendingEntry>;

#[derive(Default)]
pub(crate) struct PendingCreates {
    entries: Mutex<PendingEntries>,
}

impl PendingCreates {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PendingEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a create for `product_id` requesting `quantity` units.
    pub(crate) fn open<'a>(
        &'a self,
        entries: &mut PendingEntries,
        product_id: ProductId,
        quantity: u32,
    ) -> CreateTicket<'a> {
        let (sender, _) = watch::channel(CreateOutcome::InFlight);
        let outcome = Arc::new(sender);
        entries.insert(
            product_id.clone(),
            PendingEntry {
                quantity,
                outcome: Arc::clone(&outcome),
            },
        );
        CreateTicket {
            registry: self,
            product_id,
            outcome,
        }
    }

    /// Raise the create's requested quantity to `quantity` and subscribe to
    /// its outcome. `None` if no create is registered for the product.
    pub(crate) fn join(
        entries: &mut PendingEntries,
        product_id: &ProductId,
        quantity: u32,
    ) -> Option<watch::Receiver<CreateOutcome>> {
        let entry = entries.get_mut(product_id)?;
        entry.quantity = quantity;
        Some(entry.outcome.subscribe())
    }
}

/// Wait until the create a merged add joined has finished.
pub(crate) async fn wait(mut outcome: watch::Receiver<CreateOutcome>) -> CreateOutcome {
    outcome
        .wait_for(|state| *state != CreateOutcome::InFlight)
        .await
        .map_or_else(
            |_| CreateOutcome::Failed("line item create was abandoned".to_string()),
            |state| state.clone(),
        )
}

/// Held by the add that issued a create.
///
/// Dropping an unfinished ticket fails every joined add.
pub(crate) struct CreateTicket<'a> {
    registry: &'a PendingCreates,
    product_id: ProductId,
    outcome: Arc<watch::Sender<CreateOutcome>>,
}

impl CreateTicket<'_> {
    /// Stop accepting joins and return the total quantity requested.
    ///
    /// `None` if a newer create for the same product replaced this one.
    pub(crate) fn close(&self, entries: &mut PendingEntries) -> Option<u32> {
        let ours = entries
            .get(&self.product_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.outcome, &self.outcome));
        if !ours {
            return None;
        }
        entries.remove(&self.product_id).map(|entry| entry.quantity)
    }

    /// Report the outcome to every joined add.
    pub(crate) fn finish(self, outcome: CreateOutcome) {
        self.outcome.send_replace(outcome);
    }
}

impl Drop for CreateTicket<'_> {
    fn drop(&mut self) {
        let mut entries = self.registry.lock();
        self.close(&mut entries);
        drop(entries);
        self.outcome.send_if_modified(|state| {
            if *state != CreateOutcome::InFlight {
                return false;
            }
            *state = CreateOutcome::Failed("line item create was abandoned".to_string());
            true
        });
    }
}
