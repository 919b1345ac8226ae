//! What happens to an order after placement: status changes, payments, refunds.

mod common;

use common::*;
use shop_commerce::outbox::topics;
use shop_commerce::prelude::*;

async fn placed(shop: &Shop, owner: &str) -> Order {
    shop.orders
        .create_order(&user(owner), request(vec![OrderItemRequest::new("P1", 2)]), None)
        .await
        .unwrap()
        .order
}

async fn advance(shop: &Shop, id: &OrderId, steps: &[OrderStatus]) {
    for step in steps {
        shop.orders
            .update_status(id, *step, TransitionDetail::default())
            .await
            .unwrap();
    }
}

async fn pay(shop: &Shop, id: &OrderId) -> PaymentOutcome {
    shop.orders
        .update_payment_status(id, PaymentStatus::Completed, Some("txn-1".into()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cannot_cancel_once_shipped() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    advance(&shop, &order.id, &[OrderStatus::Processing, OrderStatus::Shipped]).await;

    let err = shop
        .orders
        .cancel_order(&order.id, &user("u1"), "changed my mind")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CommerceError::InvalidStatusTransition {
            from: "SHIPPED".into(),
            to: "CANCELLED".into(),
        }
    );

    let stored = shop.orders.get_order(&order.id, &Actor::Admin).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Shipped);
    assert!(stored.cancel_reason.is_none());
}

#[tokio::test]
async fn test_customer_cancel_records_reason() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;

    let err = shop.orders.cancel_order(&order.id, &user("u1"), "  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let cancelled = shop
        .orders
        .cancel_order(&order.id, &user("u1"), "found it cheaper")
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("found it cheaper"));
    assert!(cancelled.cancelled_at.is_some());

    // Terminal: no further movement.
    let err = shop
        .orders
        .update_status(&order.id, OrderStatus::Processing, TransitionDetail::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_only_owner_may_act_on_order() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    let stranger = user("u2");

    let err = shop
        .orders
        .get_order(&order.id, &Actor::Customer(stranger.clone()))
        .await
        .unwrap_err();
    assert_eq!(err, CommerceError::NotOrderOwner(order.id.to_string()));
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = shop.orders.cancel_order(&order.id, &stranger, "mine now").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = shop
        .orders
        .payment_for_order(&order.id, &Actor::Customer(stranger))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert!(shop
        .orders
        .payment_for_order(&order.id, &Actor::Customer(user("u1")))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_unknown_order() {
    let shop = shop().await;
    let err = shop
        .orders
        .get_order(&OrderId::new("missing"), &Actor::Admin)
        .await
        .unwrap_err();
    assert_eq!(err, CommerceError::OrderNotFound("missing".into()));
}

#[tokio::test]
async fn test_orders_for_user_only_lists_own_orders() {
    let shop = shop().await;
    let first = placed(&shop, "u1").await;
    let second = placed(&shop, "u1").await;
    placed(&shop, "u2").await;

    let orders = shop.orders.orders_for_user(&user("u1")).await.unwrap();
    let ids: Vec<_> = orders.iter().map(|o| o.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id) && ids.contains(&second.id));
    assert!(orders[0].created_at >= orders[1].created_at);
}

#[tokio::test]
async fn test_list_orders_pages_newest_first() {
    let shop = shop().await;
    let first = placed(&shop, "u1").await;
    placed(&shop, "u2").await;
    let third = placed(&shop, "u3").await;
    advance(&shop, &third.id, &[OrderStatus::Processing]).await;

    let page1 = shop
        .orders
        .list_orders(&OrderQuery { limit: 2, ..OrderQuery::default() })
        .await
        .unwrap();
    assert_eq!(page1.total, 3);
    assert_eq!(page1.orders.len(), 2);
    assert!(page1.orders[0].created_at >= page1.orders[1].created_at);

    let page2 = shop
        .orders
        .list_orders(&OrderQuery { page: 2, limit: 2, ..OrderQuery::default() })
        .await
        .unwrap();
    assert_eq!(page2.orders.len(), 1);
    assert_eq!(page2.orders[0].id, first.id);

    let processing = shop
        .orders
        .list_orders(&OrderQuery { status: Some(OrderStatus::Processing), ..OrderQuery::default() })
        .await
        .unwrap();
    assert_eq!(processing.total, 1);
    assert_eq!(processing.orders[0].id, third.id);

    let err = shop
        .orders
        .list_orders(&OrderQuery { page: 0, ..OrderQuery::default() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_completed_payment_confirms_pending_order() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;

    let outcome = pay(&shop, &order.id).await;
    assert_eq!(outcome.payment.status, PaymentStatus::Completed);
    assert_eq!(outcome.payment.transaction_id.as_deref(), Some("txn-1"));
    assert!(outcome.payment.paid_at.is_some());
    assert_eq!(outcome.order.status, OrderStatus::Confirmed);
    assert_eq!(outcome.order.payment_status, PaymentStatus::Completed);

    // Repeating the callback changes nothing.
    let again = pay(&shop, &order.id).await;
    assert_eq!(again.order.status, OrderStatus::Confirmed);
    assert_eq!(again.payment.paid_at, outcome.payment.paid_at);
}

#[tokio::test]
async fn test_failed_payment_marks_order() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;

    let outcome = shop
        .orders
        .update_payment_status(&order.id, PaymentStatus::Failed, None)
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::PaymentFailed);

    let err = shop
        .orders
        .update_payment_status(&order.id, PaymentStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidPaymentTransition { .. }));

    // An admin can still close the order out.
    let closed = shop
        .orders
        .update_status(&order.id, OrderStatus::Cancelled, TransitionDetail::reason("payment declined"))
        .await
        .unwrap();
    assert_eq!(closed.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_admin_cannot_mark_payment_failed() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;

    let err = shop
        .orders
        .update_status(&order.id, OrderStatus::PaymentFailed, TransitionDetail::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidStatusTransition { .. }));

    // The gateway's later success still confirms the order.
    let outcome = pay(&shop, &order.id).await;
    assert_eq!(outcome.order.status, OrderStatus::Confirmed);
    assert_eq!(outcome.payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_completion_requires_completed_payment() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    advance(&shop, &order.id, &[OrderStatus::Processing, OrderStatus::Shipped]).await;

    let err = shop
        .orders
        .update_status(&order.id, OrderStatus::Completed, TransitionDetail::default())
        .await
        .unwrap_err();
    assert_eq!(err, CommerceError::PaymentNotCompleted(order.id.to_string()));

    pay(&shop, &order.id).await;
    let done = shop
        .orders
        .update_status(&order.id, OrderStatus::Completed, TransitionDetail::default())
        .await
        .unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_return_after_delivery() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    pay(&shop, &order.id).await;

    let err = shop
        .orders
        .request_return(&order.id, &user("u1"), "damaged", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    advance(
        &shop,
        &order.id,
        &[OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered],
    )
    .await;
    let returned = shop
        .orders
        .request_return(&order.id, &user("u1"), "damaged", vec!["https://img/1.jpg".into()])
        .await
        .unwrap();
    assert_eq!(returned.status, OrderStatus::Returned);
    assert_eq!(returned.return_reason.as_deref(), Some("damaged"));
    assert_eq!(returned.return_images, vec!["https://img/1.jpg".to_string()]);
    assert!(returned.return_requested_at.is_some());
}

#[tokio::test]
async fn test_partial_then_full_refund() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;

    let err = shop
        .orders
        .refund_payment(&order.id, None, "too early")
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidPaymentTransition { .. }));

    pay(&shop, &order.id).await;

    let partial = shop
        .orders
        .refund_payment(&order.id, Some(vnd(50_000)), "one item missing")
        .await
        .unwrap();
    assert_eq!(partial.payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.order.payment_status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.order.status, OrderStatus::Confirmed);

    let err = shop
        .orders
        .refund_payment(&order.id, Some(vnd(150_001)), "too much")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CommerceError::RefundExceedsAmount {
            requested: 150_001,
            refundable: 150_000,
        }
    );

    let full = shop
        .orders
        .refund_payment(&order.id, None, "customer unhappy")
        .await
        .unwrap();
    assert_eq!(full.payment.status, PaymentStatus::Refunded);
    assert_eq!(full.payment.refund_history.len(), 2);
    assert!(full.payment.refunded_at.is_some());
    assert_eq!(full.order.payment_status, PaymentStatus::Refunded);

    let err = shop
        .orders
        .refund_payment(&order.id, None, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::InvalidPaymentTransition { .. }));
}

#[tokio::test]
async fn test_refund_attempts_are_limited() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    pay(&shop, &order.id).await;

    for _ in 0..3 {
        shop.orders
            .refund_payment(&order.id, Some(vnd(1_000)), "goodwill")
            .await
            .unwrap();
    }
    let err = shop
        .orders
        .refund_payment(&order.id, Some(vnd(1_000)), "goodwill")
        .await
        .unwrap_err();
    assert_eq!(err, CommerceError::RefundAttemptsExceeded(3));
}

#[tokio::test]
async fn test_status_changes_emit_events() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    take_events(&shop.db).await;

    pay(&shop, &order.id).await;
    advance(&shop, &order.id, &[OrderStatus::Processing]).await;

    let events = take_events(&shop.db).await;
    let topics: Vec<&str> = events.iter().map(|e| e.topic.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            topics::PAYMENT_STATUS_CHANGED,
            topics::ORDER_STATUS_CHANGED,
            topics::ORDER_STATUS_CHANGED,
        ]
    );
    assert_eq!(events[2].payload["to"], "PROCESSING");
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn test_rejected_change_emits_nothing() {
    let shop = shop().await;
    let order = placed(&shop, "u1").await;
    take_events(&shop.db).await;

    let _ = shop
        .orders
        .update_status(&order.id, OrderStatus::Delivered, TransitionDetail::default())
        .await
        .unwrap_err();
    assert!(take_events(&shop.db).await.is_empty());
}
