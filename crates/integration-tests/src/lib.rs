//! Integration tests for the basket client.
//!
//! Scenarios run the public [`basket_client::BasketSession`] API against the
//! in-memory store, with failures injected per operation.
//!
//! # Running Tests
//!
//! ```bash
//! RUST_LOG=basket_client=debug cargo test -p basket-integration-tests
//! ```

use std::sync::{Arc, Once};

use basket_client::{BasketSession, CheckoutConfig, InMemoryStore};
use basket_core::{OwnerId, Price, Product, ProductId};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Catalog product priced in whole units.
#[must_use]
pub fn product(id: &str, units: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        image: Some(format!("https://cdn.example.com/{id}.png")),
        price: Price::from_units(units),
        favorite: false,
    }
}

/// A store seeded with `products` and a session for owner `u1`.
#[must_use]
pub fn session_with(products: &[Product]) -> (Arc<InMemoryStore>, BasketSession<InMemoryStore>) {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    for product in products {
        store.insert_product(product.clone());
    }
    let session = BasketSession::new(
        OwnerId::new("u1"),
        Arc::clone(&store),
        CheckoutConfig::default(),
    );
    (store, session)
}
