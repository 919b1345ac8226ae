//! Property tests for pricing bounds and the two status machines.

mod common;

use common::*;
use proptest::prelude::*;
use shop_commerce::prelude::*;

fn payment_statuses() -> Vec<PaymentStatus> {
    vec![
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::PartiallyRefunded,
        PaymentStatus::Refunded,
    ]
}

#[test]
fn test_discount_never_exceeds_subtotal() {
    proptest!(|(
        subtotal in 0i64..10_000_000,
        percent in -50.0f64..250.0,
        fixed in 0i64..20_000_000,
        cap in 0i64..5_000_000,
    )| {
        let subtotal = vnd(subtotal);
        let cap = vnd(cap);

        for value in [DiscountValue::Percentage(percent), DiscountValue::Fixed(vnd(fixed))] {
            let discount = value.calculate(&subtotal, &cap).unwrap();
            prop_assert!(discount.amount >= 0);
            prop_assert!(discount.amount <= subtotal.amount);
            if let DiscountValue::Percentage(_) = value {
                prop_assert!(discount.amount <= cap.amount);
            }
        }
    });
}

#[test]
fn test_order_total_is_subtotal_minus_discount() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    proptest!(ProptestConfig::with_cases(32), |(
        quantities in proptest::collection::vec(1u32..4, 1..4),
        percent in 1.0f64..60.0,
        use_voucher in any::<bool>(),
    )| {
        let placed = runtime.block_on(async {
            let shop = shop().await;
            seed(&shop.db, Product::COLLECTION, "P2", &product("P2", 45_500, 100)).await;
            let mut v = voucher("PROP", DiscountValue::Percentage(percent), 0, 10);
            v.max_discount = vnd(90_000);
            seed(&shop.db, Voucher::COLLECTION, v.id.as_str(), &v).await;

            let lines = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| OrderItemRequest::new(if i % 2 == 0 { "P1" } else { "P2" }, *q))
                .collect();
            let mut req = request(lines);
            if use_voucher {
                req = with_code(req, "PROP");
            }
            shop.orders.create_order(&user("prop"), req, None).await.unwrap()
        });

        let order = &placed.order;
        let line_sum: i64 = order.lines.iter().map(|l| l.line_total.amount).sum();
        prop_assert_eq!(order.subtotal.amount, line_sum);
        for line in &order.lines {
            prop_assert_eq!(line.line_total.amount, line.unit_price.amount * i64::from(line.quantity));
        }
        prop_assert!(order.discount.amount >= 0 && order.discount.amount <= order.subtotal.amount);
        prop_assert_eq!(order.total.amount, order.subtotal.amount - order.discount.amount);
        prop_assert_eq!(placed.payment.amount, order.total);
        prop_assert_eq!(order.voucher.is_some(), use_voucher);
    });
}

#[test]
fn test_order_status_never_leaves_terminal_state() {
    proptest!(|(targets in proptest::collection::vec(proptest::sample::select(OrderStatus::ALL.to_vec()), 0..20))| {
        let mut current = OrderStatus::Pending;
        for target in targets {
            match current.ensure_transition(target) {
                Ok(()) => {
                    prop_assert!(!current.is_terminal());
                    prop_assert!(current.next_states().contains(&target));
                    current = target;
                }
                Err(err) => {
                    prop_assert_eq!(err.kind(), ErrorKind::Conflict);
                    prop_assert!(!current.can_transition_to(target));
                }
            }
        }
        if current.is_terminal() {
            prop_assert!(current.next_states().is_empty());
        }
    });
}

#[test]
fn test_payment_status_never_leaves_terminal_state() {
    proptest!(|(targets in proptest::collection::vec(proptest::sample::select(payment_statuses()), 0..20))| {
        let mut current = PaymentStatus::Pending;
        for target in targets {
            let allowed = current.ensure_transition(target).is_ok();
            if current.is_terminal() {
                prop_assert!(!allowed);
            }
            if allowed {
                current = target;
            }
        }
    });
}
