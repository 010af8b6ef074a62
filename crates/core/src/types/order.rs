//! Orders, checkout recipients and order notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LineItem, OrderId, OrderStatus, OwnerId, Price};

/// Errors raised while validating checkout input.
///
/// These never reach the remote store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One or more required recipient fields are blank.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// Delivery details collected at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecipientInfo {
    /// Recipient's full name.
    pub recipient_name: String,
    /// Delivery address.
    pub recipient_address: String,
    /// Contact phone number.
    pub recipient_phone: String,
}

impl RecipientInfo {
    /// Create recipient details.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            recipient_name: name.into(),
            recipient_address: address.into(),
            recipient_phone: phone.into(),
        }
    }

    /// Check that every field is non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingFields`] naming every blank field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&'static str> = [
            ("recipient_name", &self.recipient_name),
            ("recipient_address", &self.recipient_address),
            ("recipient_phone", &self.recipient_phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }
}

/// Order payload submitted to the remote store.
///
/// `line_items` is an owned copy of the basket at checkout time, never a
/// reference to live basket state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub owner_id: OwnerId,
    pub total_price: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub recipient: RecipientInfo,
    pub line_items: Vec<LineItem>,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: OwnerId,
    pub total_price: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub recipient: RecipientInfo,
    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Build the persisted order from a request and the id the store assigned.
    #[must_use]
    pub fn from_request(id: OrderId, request: OrderRequest) -> Self {
        Self {
            id,
            owner_id: request.owner_id,
            total_price: request.total_price,
            status: request.status,
            created_at: request.created_at,
            recipient: request.recipient,
            line_items: request.line_items,
        }
    }
}

/// A notification record emitted after an order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub owner_id: OwnerId,
    pub message: String,
}
