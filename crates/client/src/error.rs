//! Unified error handling for basket operations.
//!
//! Every command returns `Result<T, BasketError>`. Cart mutations that fail
//! remotely have already been rolled back by the time the error is returned.
//! Checkout problems that happen after the order is committed are not errors:
//! they are reported as [`InconsistentState`] warnings on the receipt.

use basket_core::{LineItemId, ProductId, ValidationError};
use thiserror::Error;

use crate::remote::RemoteError;

/// Which command a remote failure interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Add,
    UpdateQuantity,
    Remove,
    ToggleFavorite,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::UpdateQuantity => write!(f, "update quantity"),
            Self::Remove => write!(f, "remove"),
            Self::ToggleFavorite => write!(f, "toggle favorite"),
        }
    }
}

/// Error type for basket operations.
#[derive(Debug, Error)]
pub enum BasketError {
    /// Checkout input was incomplete. Nothing was sent to the store.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A cart command's remote call failed and the local change was undone.
    #[error("Remote call failed during {command}: {source}")]
    RemoteCall {
        command: CommandKind,
        #[source]
        source: RemoteError,
    },

    /// A full reload could not be completed. Safe to retry.
    #[error("Failed to load basket: {0}")]
    Load(#[source] RemoteError),

    /// The order could not be created. The basket is untouched.
    #[error("Order creation failed: {0}")]
    OrderCreation(#[source] RemoteError),

    /// No line item with this id is in the basket.
    #[error("Line item not found: {0}")]
    LineItemNotFound(LineItemId),
}

impl BasketError {
    /// Whether the caller may simply issue the same request again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteCall { .. } | Self::Load(_) | Self::OrderCreation(_)
        )
    }
}

/// Result type alias for `BasketError`.
pub type Result<T> = std::result::Result<T, BasketError>;

/// Partial failures after an order was committed.
///
/// Checkout still finishes; these are surfaced so the caller can log them or
/// tell the shopper that cleanup is pending.
#[derive(Debug, Error)]
pub enum InconsistentState {
    /// The order notification was not recorded.
    #[error("order notification failed: {0}")]
    NotificationFailed(#[source] RemoteError),

    /// A line item could not be deleted from the remote basket.
    #[error("failed to delete line item {line_item_id}: {source}")]
    DrainFailed {
        line_item_id: LineItemId,
        #[source]
        source: RemoteError,
    },

    /// A line item had no remote id yet, so there was nothing to delete.
    #[error("line item for product {0} was still pending and was not deleted")]
    PendingLineItemSkipped(ProductId),
}
