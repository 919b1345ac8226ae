//! Shared fixtures for order placement tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use shop_commerce::prelude::*;
use shop_db::Db;

pub const BRANCH: &str = "hcm-01";

pub fn vnd(amount: i64) -> Money {
    Money::new(amount, Currency::VND)
}

pub async fn seed<T: Serialize>(db: &Db, collection: &str, id: &str, doc: &T) {
    let mut tx = db.begin().await.unwrap();
    tx.put(collection, id, doc).unwrap();
    tx.commit().unwrap();
}

pub async fn count(db: &Db, collection: &str) -> usize {
    let tx = db.begin().await.unwrap();
    tx.count(collection, |_: &serde_json::Value| true).unwrap()
}

pub async fn load<T: serde::de::DeserializeOwned>(db: &Db, collection: &str, id: &str) -> T {
    let tx = db.begin().await.unwrap();
    tx.get(collection, id).unwrap().unwrap()
}

/// Pending outbox events, acknowledged as they are returned.
pub async fn take_events(db: &Db) -> Vec<OutboxEvent> {
    let events = Outbox::peek(db, 100).await.unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    Outbox::acknowledge(db, &seqs).await.unwrap();
    events
}

/// Product with a fixed id and product-level stock at the test branch.
pub fn product(id: &str, price: i64, stock: u32) -> Product {
    let mut p = Product::new(format!("SKU-{id}"), format!("Product {id}"), vnd(price));
    p.id = ProductId::new(id);
    p.add_stock(StockEntry::new(BRANCH, stock));
    p
}

/// Voucher with a 1,000,000 cap on percentage discounts.
pub fn voucher(code: &str, value: DiscountValue, minimum: i64, usage_limit: u32) -> Voucher {
    let now = Utc::now();
    let mut v = Voucher::new(
        code,
        value,
        vnd(minimum),
        vnd(1_000_000),
        usage_limit,
        now - Duration::days(1),
        now + Duration::days(30),
    );
    v.id = VoucherId::new(format!("v-{}", code.to_lowercase()));
    v
}

/// Percentage 10%, capped at 15,000, minimum order 50,000.
pub fn save10() -> Voucher {
    let mut v = voucher("SAVE10", DiscountValue::Percentage(10.0), 50_000, 100);
    v.max_discount = vnd(15_000);
    v
}

pub fn request(lines: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        products: lines,
        voucher_id: None,
        voucher_code: None,
        shipping_info: ShippingInfo::new("12 Le Loi, District 1", "0901234567"),
        branch_id: BranchId::new(BRANCH),
        payment_method: PaymentMethod::BankTransfer,
    }
}

pub fn with_code(mut req: CreateOrderRequest, code: &str) -> CreateOrderRequest {
    req.voucher_code = Some(code.to_string());
    req
}

/// Cart store that records which users it cleared.
#[derive(Default)]
pub struct RecordingCarts {
    pub cleared: Mutex<Vec<UserId>>,
    pub fail: bool,
}

#[async_trait]
impl CartStore for RecordingCarts {
    async fn clear(&self, user: &UserId) -> Result<(), CommerceError> {
        self.cleared.lock().unwrap().push(user.clone());
        if self.fail {
            return Err(CommerceError::Unavailable("cart service down".into()));
        }
        Ok(())
    }
}

pub struct Shop {
    pub db: Db,
    pub orders: Arc<OrderOrchestrator>,
    pub carts: Arc<RecordingCarts>,
}

/// Store with one active branch, P1 at 100,000 with 10 units, and SAVE10.
pub async fn shop() -> Shop {
    shop_with(OrderConfig::default(), false).await
}

pub async fn shop_with(config: OrderConfig, failing_carts: bool) -> Shop {
    let db = Db::new();
    seed(&db, Branch::COLLECTION, BRANCH, &Branch::new(BRANCH, "District 1")).await;
    seed(&db, Product::COLLECTION, "P1", &product("P1", 100_000, 10)).await;
    let v = save10();
    seed(&db, Voucher::COLLECTION, v.id.as_str(), &v).await;

    let carts = Arc::new(RecordingCarts {
        cleared: Mutex::new(Vec::new()),
        fail: failing_carts,
    });
    let orders = OrderOrchestrator::new(db.clone())
        .with_config(config)
        .with_cart_store(carts.clone());
    Shop {
        db,
        orders: Arc::new(orders),
        carts,
    }
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}
