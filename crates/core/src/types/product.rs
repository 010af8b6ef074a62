//! Catalog products.

use serde::{Deserialize, Serialize};

use crate::{Price, ProductId};

/// A product in the remote catalog.
///
/// The catalog owns products. The basket only reads them for display and
/// writes the `favorite` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Product title.
    pub name: String,
    /// Primary image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Current unit price.
    pub price: Price,
    /// Whether the shopper marked this product as a favorite.
    #[serde(default)]
    pub favorite: bool,
}
