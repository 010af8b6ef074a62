//! Basket line items.

use serde::{Deserialize, Serialize};

use crate::{LineItemId, OwnerId, Price, ProductId};

/// One product entry in an owner's basket.
///
/// At most one line item exists per `(owner_id, product_id)` pair. The `id`
/// is assigned by the remote store and is `None` while the create call is
/// still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Remote-assigned identifier (`None` while pending).
    pub id: Option<LineItemId>,
    /// Basket owner.
    pub owner_id: OwnerId,
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Number of units, always at least 1.
    pub quantity: u32,
    /// Price of a single unit.
    pub unit_price: Price,
    /// Product title for display.
    #[serde(default)]
    pub display_name: String,
    /// Product image URL for display.
    #[serde(default)]
    pub display_image: Option<String>,
}

impl LineItem {
    /// Create a pending line item that has not been persisted yet.
    #[must_use]
    pub fn pending(
        owner_id: OwnerId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Price,
    ) -> Self {
        Self {
            id: None,
            owner_id,
            product_id,
            quantity,
            unit_price,
            display_name: String::new(),
            display_image: None,
        }
    }

    /// Whether the remote store has not assigned an id yet.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    /// `quantity × unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }

    /// Whether this line item carries the given remote id.
    #[must_use]
    pub fn has_id(&self, id: &LineItemId) -> bool {
        self.id.as_ref() == Some(id)
    }
}
