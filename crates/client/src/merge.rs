//! Merge policy for "add" commands.
//!
//! Adding a product that is already in the basket raises the quantity of the
//! existing line item instead of creating a second one. The policy runs
//! synchronously against the mirror before any remote call is dispatched, so
//! two rapid adds of the same product coalesce into one line item.

use std::collections::HashSet;

use basket_core::{LineItem, LineItemId, ProductId};
use tracing::warn;

/// What an add did to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new pending line item was appended; the store must create it.
    Inserted,
    /// An existing line item absorbed the quantity.
    Merged {
        /// Remote id of the existing item, `None` if its create is in flight.
        line_item_id: Option<LineItemId>,
        /// Quantity before the merge.
        previous_quantity: u32,
        /// Quantity after the merge.
        quantity: u32,
    },
}

/// Coalesces adds on `(owner, product)`.
pub struct MergePolicy;

impl MergePolicy {
    /// Fold `incoming` into `items`.
    ///
    /// The mirror only ever holds one owner's items, so matching on the
    /// product id is enough to keep `(owner, product)` unique.
    pub fn apply(items: &mut Vec<LineItem>, incoming: LineItem) -> MergeOutcome {
        if let Some(existing) = items
            .iter_mut()
            .find(|item| item.product_id == incoming.product_id)
        {
            let previous_quantity = existing.quantity;
            existing.quantity = previous_quantity.saturating_add(incoming.quantity);
            if existing.display_name.is_empty() {
                existing.display_name = incoming.display_name;
            }
            if existing.display_image.is_none() {
                existing.display_image = incoming.display_image;
            }
            return MergeOutcome::Merged {
                line_item_id: existing.id.clone(),
                previous_quantity,
                quantity: existing.quantity,
            };
        }

        items.push(incoming);
        MergeOutcome::Inserted
    }

    /// Keep the first record per product from a full remote listing.
    ///
    /// The store does not enforce uniqueness, so a listing can carry
    /// duplicates written by another client.
    pub fn dedupe(records: Vec<LineItem>) -> Vec<LineItem> {
        let mut seen: HashSet<ProductId> = HashSet::with_capacity(records.len());
        records
            .into_iter()
            .filter(|record| {
                let first = seen.insert(record.product_id.clone());
                if !first {
                    warn!(
                        product_id = %record.product_id,
                        line_item_id = ?record.id,
                        "Ignoring duplicate remote line item"
                    );
                }
                first
            })
            .collect()
    }
}
