//! Integration tests for checkout.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use basket_client::remote::memory::StoreOp;
use basket_client::{BasketError, CheckoutState, InconsistentState};
use basket_core::{OrderStatus, OwnerId, Price, ProductId, RecipientInfo};
use basket_integration_tests::{product, session_with};

fn recipient() -> RecipientInfo {
    RecipientInfo::new("Grace Hopper", "1 Harbor Ln", "555-0199")
}

#[tokio::test]
async fn test_checkout_places_order_and_empties_basket() {
    let catalog = [product("P1", 10), product("P2", 4)];
    let (store, session) = session_with(&catalog);
    session.add_product(&catalog[0], 2).await.unwrap();
    session.add_product(&catalog[1], 3).await.unwrap();

    let receipt = session.checkout(recipient()).await.unwrap();

    assert!(receipt.is_clean());
    assert_eq!(receipt.trail.last(), Some(&CheckoutState::Done));
    assert_eq!(receipt.order.total_price, Price::from_units(32));
    assert_eq!(receipt.order.status, OrderStatus::Processing);
    assert_eq!(receipt.order.recipient.recipient_name, "Grace Hopper");
    assert_eq!(receipt.order.line_items.len(), 2);

    assert!(session.snapshot().is_empty());
    assert!(store.line_items(&OwnerId::new("u1")).is_empty());
    assert_eq!(store.orders().len(), 1);
    let notification = store.notifications().pop().unwrap();
    assert!(notification.message.contains(receipt.order.id.as_str()));
    assert!(notification.message.contains("32.00"));
}

#[tokio::test]
async fn test_checkout_of_empty_basket_has_zero_total() {
    let (store, session) = session_with(&[]);

    let receipt = session.checkout(recipient()).await.unwrap();

    assert_eq!(receipt.order.total_price, Price::ZERO);
    assert_eq!(store.orders().len(), 1);
}

#[tokio::test]
async fn test_blank_recipient_is_rejected_before_any_call() {
    let p1 = product("P1", 10);
    let (store, session) = session_with(std::slice::from_ref(&p1));
    session.add_product(&p1, 1).await.unwrap();
    let calls = store.calls().len();

    let result = session
        .checkout(RecipientInfo::new("  ", "1 Harbor Ln", ""))
        .await;

    let Err(BasketError::Validation(e)) = result else {
        panic!("expected validation error");
    };
    assert!(e.to_string().contains("recipient_name"));
    assert!(e.to_string().contains("recipient_phone"));
    assert_eq!(store.calls().len(), calls);
    assert!(!session.snapshot().is_empty());
}

#[tokio::test]
async fn test_order_failure_can_be_retried() {
    let p1 = product("P1", 10);
    let (store, session) = session_with(std::slice::from_ref(&p1));
    session.add_product(&p1, 2).await.unwrap();
    store.fail_next(StoreOp::CreateOrder);

    let first = session.checkout(recipient()).await;
    assert!(matches!(first, Err(BasketError::OrderCreation(_))));
    assert_eq!(session.snapshot().total(), Price::from_units(20));
    assert!(store.orders().is_empty());

    let receipt = session.checkout(recipient()).await.unwrap();
    assert_eq!(receipt.order.total_price, Price::from_units(20));
    assert_eq!(store.orders().len(), 1);
}

#[tokio::test]
async fn test_cleanup_failures_are_reported_not_raised() {
    let catalog = [product("P1", 10), product("P2", 4)];
    let (store, session) = session_with(&catalog);
    session.add_product(&catalog[0], 1).await.unwrap();
    session.add_product(&catalog[1], 1).await.unwrap();
    store.fail_next(StoreOp::CreateNotification);
    store.fail_next(StoreOp::DeleteLineItem);

    let receipt = session.checkout(recipient()).await.unwrap();

    assert_eq!(receipt.trail.last(), Some(&CheckoutState::Done));
    assert_eq!(receipt.warnings.len(), 2);
    assert!(matches!(
        receipt.warnings[0],
        InconsistentState::NotificationFailed(_)
    ));
    assert!(matches!(
        receipt.warnings[1],
        InconsistentState::DrainFailed { .. }
    ));
    assert!(session.snapshot().is_empty());
    // One delete failed, so one stale record remains remotely.
    assert_eq!(store.line_items(&OwnerId::new("u1")).len(), 1);
}

#[tokio::test]
async fn test_add_merge_remove_then_empty_checkout() {
    let (store, session) = session_with(&[]);

    session
        .add(ProductId::new("P1"), 2, Price::from_units(10))
        .await
        .unwrap();
    let merged = session
        .add(ProductId::new("P1"), 3, Price::from_units(10))
        .await
        .unwrap();
    assert_eq!(merged.items().len(), 1);
    assert_eq!(merged.items()[0].quantity, 5);
    assert_eq!(merged.total(), Price::from_units(50));

    let id = merged.items()[0].id.clone().unwrap();
    let emptied = session.remove(&id).await.unwrap();
    assert!(emptied.is_empty());
    assert_eq!(emptied.total(), Price::ZERO);

    let receipt = session.checkout(recipient()).await.unwrap();
    assert_eq!(receipt.order.total_price, Price::ZERO);
    assert!(receipt.order.line_items.is_empty());
    assert_eq!(store.orders().len(), 1);
}
