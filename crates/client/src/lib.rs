//! Basket client library.
//!
//! Keeps a client-side mirror of a shopper's remote basket that updates
//! instantly and converges with the remote store.
//!
//! # Architecture
//!
//! - [`remote`] - The `RemoteStore` seam plus HTTP and in-memory adapters
//! - [`mirror`] - Snapshot-based view of the basket
//! - [`merge`] - Coalesces repeated adds of the same product
//! - [`sync`] - Optimistic commands with rollback and reload
//! - [`checkout`] - Order placement state machine
//! - [`favorite`] - Optimistic product favorite flag
//! - [`session`] - The per-shopper context object a UI holds
//!
//! # Example
//!
//! ```rust,ignore
//! use basket_client::{BasketConfig, BasketSession};
//! use basket_core::{OwnerId, RecipientInfo};
//!
//! let config = BasketConfig::from_env()?;
//! let session = BasketSession::connect(OwnerId::new("user-1"), &config)?;
//!
//! session.reload().await?;
//! session.add_product(&product, 2).await?;
//!
//! let receipt = session
//!     .checkout(RecipientInfo::new("Ada", "12 Analytical Way", "555-0100"))
//!     .await?;
//! for warning in &receipt.warnings {
//!     tracing::warn!(%warning, "Checkout cleanup incomplete");
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod checkout;
pub mod config;
pub mod error;
pub mod favorite;
pub mod merge;
pub mod mirror;
mod pending;
pub mod remote;
pub mod session;
pub mod sync;

pub use checkout::{CheckoutCoordinator, CheckoutReceipt, CheckoutState};
pub use config::{BasketConfig, CheckoutConfig, ConfigError, RemoteStoreConfig};
pub use error::{BasketError, CommandKind, InconsistentState, Result};
pub use favorite::FavoriteToggle;
pub use mirror::{CartSnapshot, LineItemMirror};
pub use remote::{HttpRemoteStore, InMemoryStore, RemoteError, RemoteStore};
pub use session::BasketSession;
pub use sync::SyncEngine;
