//! Core types for the basket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod line_item;
pub mod order;
pub mod price;
pub mod product;
pub mod status;

pub use id::*;
pub use line_item::LineItem;
pub use order::{Notification, Order, OrderRequest, RecipientInfo, ValidationError};
pub use price::{Price, PriceError};
pub use product::Product;
pub use status::*;
