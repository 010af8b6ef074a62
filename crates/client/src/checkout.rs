//! Checkout coordinator.
//!
//! Turns the current basket into a persisted order:
//!
//! ```text
//! Idle -> OrderCreated -> NotificationSent -> CartDrained -> Done
//!   \___________ Failed(reason) (validation or order creation only)
//! ```
//!
//! Creating the order is the commit point. Before it, any failure aborts and
//! leaves the basket untouched. After it, the coordinator always reaches
//! `Done`: the notification and the remote line item deletes are best-effort
//! and their failures are collected as [`InconsistentState`] warnings. The
//! order is never re-submitted or cancelled automatically because order
//! creation is not idempotent.

use basket_core::{Notification, Order, OrderRequest, OrderStatus, RecipientInfo};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::CheckoutConfig;
use crate::error::{BasketError, InconsistentState, Result};
use crate::remote::RemoteStore;
use crate::sync::SyncEngine;

/// Coordinator states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    OrderCreated,
    NotificationSent,
    CartDrained,
    Done,
    Failed(String),
}

impl CheckoutState {
    /// Whether the coordinator has stopped.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Result of a committed checkout.
#[derive(Debug)]
pub struct CheckoutReceipt {
    /// The persisted order.
    pub order: Order,
    /// Cleanup steps that did not succeed.
    pub warnings: Vec<InconsistentState>,
    /// States visited, starting with `Idle` and ending with `Done`.
    pub trail: Vec<CheckoutState>,
}

impl CheckoutReceipt {
    /// Whether every post-commit step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Drives one checkout attempt against a sync engine's basket.
pub struct CheckoutCoordinator<'a, S> {
    engine: &'a SyncEngine<S>,
    config: &'a CheckoutConfig,
    state: CheckoutState,
    trail: Vec<CheckoutState>,
}

impl<'a, S: RemoteStore> CheckoutCoordinator<'a, S> {
    #[must_use]
    pub fn new(engine: &'a SyncEngine<S>, config: &'a CheckoutConfig) -> Self {
        Self {
            engine,
            config,
            state: CheckoutState::Idle,
            trail: vec![CheckoutState::Idle],
        }
    }

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// States visited so far.
    #[must_use]
    pub fn trail(&self) -> &[CheckoutState] {
        &self.trail
    }

    fn transition(&mut self, next: CheckoutState) {
        self.trail.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, err: BasketError) -> BasketError {
        self.transition(CheckoutState::Failed(err.to_string()));
        err
    }

    /// Place the order.
    ///
    /// An empty basket is allowed and produces an order with a zero total.
    ///
    /// # Errors
    ///
    /// - [`BasketError::Validation`] if a recipient field is blank; no remote
    ///   call is made.
    /// - [`BasketError::OrderCreation`] if the store rejects the order; the
    ///   basket is untouched and the caller may retry.
    #[instrument(skip(self, recipient), fields(owner_id = %self.engine.owner_id()))]
    pub async fn run(&mut self, recipient: RecipientInfo) -> Result<CheckoutReceipt> {
        if let Err(e) = recipient.validate() {
            return Err(self.fail(e.into()));
        }

        let snapshot = self.engine.snapshot();
        let request = OrderRequest {
            owner_id: self.engine.owner_id().clone(),
            total_price: snapshot.total(),
            status: OrderStatus::Processing,
            created_at: Utc::now(),
            recipient,
            line_items: snapshot.items().to_vec(),
        };

        let order = match self.engine.store().create_order(request).await {
            Ok(order) => order,
            Err(e) => return Err(self.fail(BasketError::OrderCreation(e))),
        };
        info!(order_id = %order.id, total = %order.total_price, "Order created");
        self.transition(CheckoutState::OrderCreated);

        let mut warnings = Vec::new();

        let notification = Notification {
            owner_id: order.owner_id.clone(),
            message: self
                .config
                .render_notification(order.id.as_str(), &order.total_price.to_string()),
        };
        if let Err(e) = self.engine.store().create_notification(notification).await {
            warn!(order_id = %order.id, error = %e, "Order notification failed");
            warnings.push(InconsistentState::NotificationFailed(e));
        }
        self.transition(CheckoutState::NotificationSent);

        self.drain(&mut warnings).await;
        self.transition(CheckoutState::CartDrained);

        self.engine.clear_local();
        self.transition(CheckoutState::Done);

        Ok(CheckoutReceipt {
            order,
            warnings,
            trail: self.trail.clone(),
        })
    }

    /// Delete every line item still in the basket from the store.
    async fn drain(&self, warnings: &mut Vec<InconsistentState>) {
        let snapshot = self.engine.snapshot();
        for item in snapshot.items() {
            let Some(id) = item.id.as_ref() else {
                warn!(product_id = %item.product_id, "Skipping delete of pending line item");
                warnings.push(InconsistentState::PendingLineItemSkipped(
                    item.product_id.clone(),
                ));
                continue;
            };
            if let Err(e) = self.engine.store().delete_line_item(id).await {
                warn!(line_item_id = %id, error = %e, "Failed to delete line item after checkout");
                warnings.push(InconsistentState::DrainFailed {
                    line_item_id: id.clone(),
                    source: e,
                });
            }
        }
    }
}
