//! Order placement and post-creation lifecycle.
//!
//! Every operation runs in one unit of work: reads, checks and writes
//! either commit together or leave nothing behind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shop_db::{Db, DbError, Tx};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{Branch, InventoryLedger, Product, ProductDemand, ProductStockLedger, StockScope};
use crate::checkout::{
    AppliedVoucher, CartStore, CreateOrderRequest, Order, OrderLine, OrderStatus, StoreCartStore,
    TransitionDetail,
};
use crate::ids::{BranchId, OrderId, ProductId, UserId};
use crate::money::{Currency, Money};
use crate::outbox::{topics, Outbox};
use crate::payment::{Payment, PaymentInitiator, PaymentPolicy, PaymentStatus};
use crate::pricing::PricingEngine;
use crate::retry::RetryPolicy;
use crate::voucher::{ScopedLine, VoucherQuote, VoucherSelector, VoucherValidator};
use crate::{CommerceError, ErrorKind};

/// Longest accepted idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Which stock locations count toward availability.
    pub stock_scope: StockScope,
    /// Currency every price must be in.
    pub currency: Currency,
    /// Retry for keyed creations that hit a transient store failure.
    pub retry: RetryPolicy,
    /// How long to wait for the store before giving up.
    #[serde(with = "opt_millis")]
    pub transaction_timeout: Option<Duration>,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            stock_scope: StockScope::AllLocations,
            currency: Currency::VND,
            retry: RetryPolicy::default(),
            transaction_timeout: None,
        }
    }
}

/// Who is acting on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// A customer, limited to their own orders.
    Customer(UserId),
    /// Staff, allowed to see every order.
    Admin,
}

/// Result of order creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPlacement {
    pub order: Order,
    pub payment: Payment,
    /// The order was created by an earlier request with the same key.
    pub replayed: bool,
}

/// Filter and page for the staff order listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderQuery {
    /// 1-based page number.
    pub page: u32,
    /// Orders per page, at most [`OrderQuery::MAX_LIMIT`].
    pub limit: u32,
    pub status: Option<OrderStatus>,
    pub branch_id: Option<BranchId>,
}

impl OrderQuery {
    pub const MAX_LIMIT: u32 = 100;

    fn validate(&self) -> Result<(), CommerceError> {
        if self.page == 0 {
            return Err(CommerceError::Validation("page starts at 1".into()));
        }
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(CommerceError::Validation(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(())
    }

    fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.branch_id.as_ref().map_or(true, |b| &order.branch_id == b)
    }
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            status: None,
            branch_id: None,
        }
    }
}

/// One page of the staff order listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Orders matching the filter across all pages.
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Order and payment after a payment-side change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub order: Order,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdempotencyRecord {
    key: String,
    user_id: UserId,
    order_id: OrderId,
    created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    const COLLECTION: &'static str = "idempotency_keys";
}

/// Places orders and drives them through their lifecycle.
pub struct OrderOrchestrator {
    db: Db,
    inventory: Arc<dyn InventoryLedger>,
    pricing: PricingEngine,
    vouchers: VoucherValidator,
    payments: PaymentInitiator,
    carts: Arc<dyn CartStore>,
    config: OrderConfig,
}

impl OrderOrchestrator {
    /// Orchestrator over `db` with the stock ledger and cart store it holds.
    ///
    /// Every collaborator can be swapped with the `with_*` builders.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = Db::open("shop.db", DbConfig::default())?;
    /// let orders = OrderOrchestrator::new(db.clone())
    ///     .with_payment_policy(PaymentPolicy::default())
    ///     .with_cart_store(Arc::new(StoreCartStore::new(db)));
    /// ```
    pub fn new(db: Db) -> Self {
        Self {
            carts: Arc::new(StoreCartStore::new(db.clone())),
            db,
            inventory: Arc::new(ProductStockLedger),
            pricing: PricingEngine::new(),
            vouchers: VoucherValidator::new(),
            payments: PaymentInitiator::default(),
            config: OrderConfig::default(),
        }
    }

    /// Replace the orchestrator settings.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let orders = OrderOrchestrator::new(db).with_config(OrderConfig {
    ///     stock_scope: StockScope::OrderBranch,
    ///     transaction_timeout: Some(Duration::from_secs(2)),
    ///     ..OrderConfig::default()
    /// });
    /// ```
    pub fn with_config(mut self, config: OrderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_payment_policy(mut self, policy: PaymentPolicy) -> Self {
        self.payments = PaymentInitiator::new(policy);
        self
    }

    /// Use a different stock ledger, e.g. one backed by a warehouse service.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// struct Warehouse { /* ... */ }
    ///
    /// impl InventoryLedger for Warehouse {
    ///     fn available(
    ///         &self,
    ///         tx: &Tx,
    ///         product: &Product,
    ///         variant_id: Option<&VariantId>,
    ///         branch_id: Option<&BranchId>,
    ///     ) -> Result<u32, CommerceError> { /* ... */ }
    ///
    ///     fn check_demand(
    ///         &self,
    ///         tx: &Tx,
    ///         product: &Product,
    ///         demand: &ProductDemand,
    ///         variant_branch: Option<&BranchId>,
    ///     ) -> Result<(), CommerceError> { /* ... */ }
    /// }
    ///
    /// let orders = OrderOrchestrator::new(db).with_inventory(Arc::new(Warehouse { /* ... */ }));
    /// ```
    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryLedger>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_cart_store(mut self, carts: Arc<dyn CartStore>) -> Self {
        self.carts = carts;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    async fn begin(&self) -> Result<Tx, CommerceError> {
        let tx = match self.config.transaction_timeout {
            Some(timeout) => self.db.begin_with_timeout(timeout).await?,
            None => self.db.begin().await?,
        };
        Ok(tx)
    }

    /// Run `work` in one unit of work, committing only if it succeeds.
    async fn unit_of_work<T, F>(&self, work: F) -> Result<T, CommerceError>
    where
        F: FnOnce(&mut Tx) -> Result<T, CommerceError>,
    {
        let mut tx = self.begin().await?;
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    // --- creation ---------------------------------------------------------

    /// Create an order and its payment atomically.
    ///
    /// With an idempotency key, a repeated request returns the order the key
    /// already produced, and a transient store failure is retried.
    #[instrument(skip(self, request), fields(user_id = %user, lines = request.products.len()))]
    pub async fn create_order(
        &self,
        user: &UserId,
        request: CreateOrderRequest,
        idempotency_key: Option<&str>,
    ) -> Result<OrderPlacement, CommerceError> {
        request.validate()?;
        let selector = request.voucher_selector()?;
        let key = match idempotency_key.map(str::trim) {
            Some("") => return Err(CommerceError::Validation("Idempotency-Key must not be blank".into())),
            Some(k) if k.len() > MAX_IDEMPOTENCY_KEY_LEN => {
                return Err(CommerceError::Validation(format!(
                    "Idempotency-Key longer than {MAX_IDEMPOTENCY_KEY_LEN} characters"
                )))
            }
            other => other,
        };

        let mut attempt = 0;
        let placement = loop {
            let result = self
                .unit_of_work(|tx| self.place(tx, user, &request, selector.as_ref(), key, Utc::now()))
                .await;
            match result {
                Ok(placement) => break placement,
                Err(err) if key.is_some() && self.config.retry.should_retry(&err, attempt) => {
                    warn!(error = %err, attempt, "order creation hit a transient failure, retrying");
                    tokio::time::sleep(self.config.retry.backoff.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    log_rejection(&err, "order creation failed, nothing was written");
                    return Err(err);
                }
            }
        };

        if placement.replayed {
            info!(order_id = %placement.order.id, "order creation replayed from idempotency key");
            return Ok(placement);
        }

        info!(
            order_id = %placement.order.id,
            total = placement.order.total.amount,
            "order created"
        );
        if let Err(err) = self.carts.clear(user).await {
            warn!(error = %err, "failed to clear cart after order creation");
        }
        Ok(placement)
    }

    fn place(
        &self,
        tx: &mut Tx,
        user: &UserId,
        request: &CreateOrderRequest,
        selector: Option<&VoucherSelector>,
        key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<OrderPlacement, CommerceError> {
        if let Some(key) = key {
            if let Some(placement) = self.replay(tx, user, key)? {
                return Ok(placement);
            }
        }

        Branch::require_active(tx, &request.branch_id)?;

        let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
        for item in &request.products {
            if products.contains_key(&item.product_id) {
                continue;
            }
            let product = Product::fetch(tx, &item.product_id)?;
            if !product.is_available() {
                return Err(CommerceError::ProductUnavailable(product.id.to_string()));
            }
            products.insert(product.id.clone(), product);
        }

        // Every line is checked before anything is written, and all lines of
        // one product are checked together since they draw on shared stock.
        let mut demands: BTreeMap<&ProductId, ProductDemand> = BTreeMap::new();
        for item in &request.products {
            demands
                .entry(&item.product_id)
                .or_default()
                .add(item.variant_id.as_ref(), item.quantity);
        }
        let variant_branch = match self.config.stock_scope {
            StockScope::OrderBranch => Some(&request.branch_id),
            StockScope::AllLocations => None,
        };
        for (product_id, demand) in &demands {
            let product = lookup(&products, product_id)?;
            self.inventory
                .check_demand(tx, product, demand, variant_branch)?;
        }

        let mut lines = Vec::with_capacity(request.products.len());
        for item in &request.products {
            let product = lookup(&products, &item.product_id)?;
            let unit_price = self.pricing.price_for(product, item.variant_id.as_ref())?;
            if unit_price.currency != self.config.currency {
                return Err(CommerceError::CurrencyMismatch {
                    expected: self.config.currency.code().to_string(),
                    got: unit_price.currency.code().to_string(),
                });
            }
            let variant = item.variant_id.as_ref().and_then(|id| product.variant(id));
            let mut selected_options = item.options.clone();
            if selected_options.is_empty() {
                if let Some(variant) = variant {
                    selected_options = variant
                        .options
                        .iter()
                        .map(|o| (o.name.clone(), o.value.clone()))
                        .collect();
                }
            }
            lines.push(OrderLine {
                product_id: product.id.clone(),
                variant_id: item.variant_id.clone(),
                product_name: product.name.clone(),
                sku: variant.map_or_else(|| product.sku.clone(), |v| v.sku.clone()),
                selected_options,
                quantity: item.quantity,
                unit_price,
                line_total: self.pricing.line_total(&unit_price, item.quantity)?,
            });
        }

        let subtotal = self
            .pricing
            .subtotal(lines.iter().map(|l| &l.line_total), self.config.currency)?;

        let quote: Option<VoucherQuote> = match selector {
            Some(selector) => {
                let mut scoped = Vec::with_capacity(lines.len());
                for line in &lines {
                    scoped.push(ScopedLine {
                        product_id: &line.product_id,
                        category_ids: &lookup(&products, &line.product_id)?.category_ids,
                        line_total: &line.line_total,
                    });
                }
                Some(self.vouchers.validate_and_price(tx, selector, user, &scoped, &subtotal, now)?)
            }
            None => None,
        };
        let discount = quote
            .as_ref()
            .map_or(Money::zero(self.config.currency), |q| q.discount);
        let total = subtotal.checked_sub(&discount)?;

        let order = Order {
            id: OrderId::generate(),
            user_id: user.clone(),
            lines,
            voucher: quote.as_ref().map(|q| AppliedVoucher {
                voucher_id: q.voucher_id.clone(),
                code: q.code.clone(),
                discount: q.discount,
            }),
            subtotal,
            discount,
            total,
            shipping_info: request.shipping_info.clone(),
            branch_id: request.branch_id.clone(),
            payment_method: request.payment_method,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            cancel_reason: None,
            return_reason: None,
            return_images: Vec::new(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            return_requested_at: None,
        };
        tx.insert(Order::COLLECTION, order.id.as_str(), &order)?;

        let payment = self
            .payments
            .create(tx, &order.id, user, order.total, request.payment_method)?;

        if let Some(quote) = &quote {
            let voucher = self.vouchers.redeem(tx, &quote.voucher_id, user, now)?;
            Outbox::append(
                tx,
                topics::VOUCHER_REDEEMED,
                voucher.id.as_str(),
                &json!({
                    "voucher_id": voucher.id,
                    "order_id": order.id,
                    "user_id": user,
                    "used_count": voucher.used_count,
                }),
            )?;
        }

        Outbox::append(
            tx,
            topics::ORDER_CREATED,
            order.id.as_str(),
            &json!({
                "order_id": order.id,
                "user_id": user,
                "payment_id": payment.id,
                "total": order.total,
            }),
        )?;

        if let Some(key) = key {
            let record = IdempotencyRecord {
                key: key.to_string(),
                user_id: user.clone(),
                order_id: order.id.clone(),
                created_at: now,
            };
            tx.insert(IdempotencyRecord::COLLECTION, key, &record)?;
        }

        debug!(tx = tx.id(), order_id = %order.id, "order staged");
        Ok(OrderPlacement {
            order,
            payment,
            replayed: false,
        })
    }

    fn replay(&self, tx: &Tx, user: &UserId, key: &str) -> Result<Option<OrderPlacement>, CommerceError> {
        let Some(record) = tx.get::<IdempotencyRecord>(IdempotencyRecord::COLLECTION, key)? else {
            return Ok(None);
        };
        if &record.user_id != user {
            return Err(CommerceError::Validation(
                "Idempotency-Key was already used by another caller".into(),
            ));
        }
        let order = load_order(tx, &record.order_id)?;
        let payment = self.payments.require_by_order(tx, &order.id)?;
        Ok(Some(OrderPlacement {
            order,
            payment,
            replayed: true,
        }))
    }

    // --- reads ------------------------------------------------------------

    /// Load an order the actor may see.
    pub async fn get_order(&self, id: &OrderId, actor: &Actor) -> Result<Order, CommerceError> {
        let tx = self.begin().await?;
        let order = load_order(&tx, id)?;
        authorize(&order, actor)?;
        Ok(order)
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user: &UserId) -> Result<Vec<Order>, CommerceError> {
        let tx = self.begin().await?;
        let mut orders: Vec<Order> = tx.find(Order::COLLECTION, |o: &Order| &o.user_id == user)?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(orders)
    }

    /// Every order matching `query`, newest first, one page at a time.
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, CommerceError> {
        query.validate()?;
        let tx = self.begin().await?;
        let mut orders: Vec<Order> = tx.find(Order::COLLECTION, |o: &Order| query.matches(o))?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = orders.len();
        let skip = (query.page as usize - 1).saturating_mul(query.limit as usize);
        let orders = orders.into_iter().skip(skip).take(query.limit as usize).collect();
        Ok(OrderPage {
            orders,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    /// Payment of an order the actor may see.
    pub async fn payment_for_order(&self, id: &OrderId, actor: &Actor) -> Result<Payment, CommerceError> {
        let tx = self.begin().await?;
        let order = load_order(&tx, id)?;
        authorize(&order, actor)?;
        self.payments.require_by_order(&tx, id)
    }

    // --- status machine ---------------------------------------------------

    /// Admin status change.
    #[instrument(skip(self, detail), fields(order_id = %id, target = %target))]
    pub async fn update_status(
        &self,
        id: &OrderId,
        target: OrderStatus,
        detail: TransitionDetail,
    ) -> Result<Order, CommerceError> {
        let result = self
            .unit_of_work(|tx| {
                let mut order = load_order(tx, id)?;
                if target == OrderStatus::Completed {
                    // Completion is gated on the payment record itself.
                    order.payment_status = self.payments.require_by_order(tx, id)?.status;
                }
                self.transition(tx, order, target, &detail, Utc::now())
            })
            .await;
        log_outcome(&result, "order status updated");
        result
    }

    /// Customer cancellation, allowed while PENDING or PROCESSING.
    #[instrument(skip(self, reason), fields(order_id = %id, user_id = %user))]
    pub async fn cancel_order(&self, id: &OrderId, user: &UserId, reason: &str) -> Result<Order, CommerceError> {
        let detail = TransitionDetail::reason(reason);
        let result = self
            .unit_of_work(|tx| {
                let order = load_order(tx, id)?;
                authorize(&order, &Actor::Customer(user.clone()))?;
                if !order.status.can_cancel() {
                    return Err(CommerceError::InvalidStatusTransition {
                        from: order.status.as_str().to_string(),
                        to: OrderStatus::Cancelled.as_str().to_string(),
                    });
                }
                self.transition(tx, order, OrderStatus::Cancelled, &detail, Utc::now())
            })
            .await;
        log_outcome(&result, "order cancelled");
        result
    }

    /// Customer return request, allowed once DELIVERED.
    #[instrument(skip(self, reason, images), fields(order_id = %id, user_id = %user))]
    pub async fn request_return(
        &self,
        id: &OrderId,
        user: &UserId,
        reason: &str,
        images: Vec<String>,
    ) -> Result<Order, CommerceError> {
        let detail = TransitionDetail {
            reason: Some(reason.to_string()),
            images,
        };
        let result = self
            .unit_of_work(|tx| {
                let order = load_order(tx, id)?;
                authorize(&order, &Actor::Customer(user.clone()))?;
                self.transition(tx, order, OrderStatus::Returned, &detail, Utc::now())
            })
            .await;
        log_outcome(&result, "order returned");
        result
    }

    fn transition(
        &self,
        tx: &mut Tx,
        order: Order,
        target: OrderStatus,
        detail: &TransitionDetail,
        now: DateTime<Utc>,
    ) -> Result<Order, CommerceError> {
        let previous = order.status;
        let mut updated = order;
        updated.transition(target, detail, now)?;
        save_order(tx, previous, &updated)?;
        Outbox::append(
            tx,
            topics::ORDER_STATUS_CHANGED,
            updated.id.as_str(),
            &json!({ "order_id": updated.id, "from": previous, "to": target }),
        )?;
        Ok(updated)
    }

    // --- payment ----------------------------------------------------------

    /// Gateway or admin payment status update, cascading to the order.
    #[instrument(skip(self, transaction_id), fields(order_id = %id, target = %target))]
    pub async fn update_payment_status(
        &self,
        id: &OrderId,
        target: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<PaymentOutcome, CommerceError> {
        let result = self
            .unit_of_work(|tx| {
                let now = Utc::now();
                let order = load_order(tx, id)?;
                let update = self.payments.transition(tx, id, target, transaction_id, now)?;
                if !update.changed() {
                    return Ok(PaymentOutcome {
                        order,
                        payment: update.payment,
                    });
                }

                Outbox::append(
                    tx,
                    topics::PAYMENT_STATUS_CHANGED,
                    update.payment.id.as_str(),
                    &json!({
                        "order_id": id,
                        "payment_id": update.payment.id,
                        "from": update.previous,
                        "to": update.payment.status,
                        "transaction_id": update.payment.transaction_id,
                    }),
                )?;
                if update.payment.status == PaymentStatus::Refunded {
                    append_refund_event(tx, &update.payment)?;
                }
                let order = self.mirror_payment(tx, order, &update.payment, now)?;
                Ok(PaymentOutcome {
                    order,
                    payment: update.payment,
                })
            })
            .await;
        log_outcome(&result, "payment status updated");
        result
    }

    /// Refund part or all of an order's payment.
    #[instrument(skip(self, amount, reason), fields(order_id = %id))]
    pub async fn refund_payment(
        &self,
        id: &OrderId,
        amount: Option<Money>,
        reason: &str,
    ) -> Result<PaymentOutcome, CommerceError> {
        let result = self
            .unit_of_work(|tx| {
                let now = Utc::now();
                let order = load_order(tx, id)?;
                let payment = self.payments.refund(tx, id, amount, reason, now)?;
                append_refund_event(tx, &payment)?;
                let order = self.mirror_payment(tx, order, &payment, now)?;
                Ok(PaymentOutcome { order, payment })
            })
            .await;
        log_outcome(&result, "payment refunded");
        result
    }

    fn mirror_payment(
        &self,
        tx: &mut Tx,
        order: Order,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<Order, CommerceError> {
        let previous = order.status;
        let mut updated = order;
        let cascade = updated.apply_payment_status(payment.status, now);
        save_order(tx, previous, &updated)?;
        if let Some(next) = cascade {
            info!(order_id = %updated.id, from = %previous, to = %next, "order status follows payment");
            Outbox::append(
                tx,
                topics::ORDER_STATUS_CHANGED,
                updated.id.as_str(),
                &json!({ "order_id": updated.id, "from": previous, "to": next }),
            )?;
        }
        Ok(updated)
    }
}

impl std::fmt::Debug for OrderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderOrchestrator")
            .field("config", &self.config)
            .field("payments", &self.payments)
            .finish_non_exhaustive()
    }
}

fn lookup<'a>(products: &'a BTreeMap<ProductId, Product>, id: &ProductId) -> Result<&'a Product, CommerceError> {
    products
        .get(id)
        .ok_or_else(|| CommerceError::ProductNotFound(id.to_string()))
}

fn load_order(tx: &Tx, id: &OrderId) -> Result<Order, CommerceError> {
    tx.get(Order::COLLECTION, id.as_str())?
        .ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))
}

fn authorize(order: &Order, actor: &Actor) -> Result<(), CommerceError> {
    match actor {
        Actor::Admin => Ok(()),
        Actor::Customer(user) if order.is_owned_by(user) => Ok(()),
        Actor::Customer(_) => Err(CommerceError::NotOrderOwner(order.id.to_string())),
    }
}

/// Write `updated` only if the stored order is still in `previous` status.
fn save_order(tx: &mut Tx, previous: OrderStatus, updated: &Order) -> Result<(), CommerceError> {
    tx.update_if(
        Order::COLLECTION,
        updated.id.as_str(),
        |stored: &Order| stored.status == previous,
        |stored| *stored = updated.clone(),
    )
    .map_err(|e| match e {
        DbError::ConditionFailed { .. } => CommerceError::ConcurrentModification(format!("order {}", updated.id)),
        DbError::NotFound { .. } => CommerceError::OrderNotFound(updated.id.to_string()),
        other => other.into(),
    })?;
    Ok(())
}

fn append_refund_event(tx: &mut Tx, payment: &Payment) -> Result<(), CommerceError> {
    let latest = payment.refund_history.last();
    Outbox::append(
        tx,
        topics::PAYMENT_REFUNDED,
        payment.id.as_str(),
        &json!({
            "order_id": payment.order_id,
            "payment_id": payment.id,
            "amount": latest.map(|r| r.amount),
            "reason": latest.map(|r| r.reason.as_str()),
            "status": payment.status,
        }),
    )?;
    Ok(())
}

fn log_rejection(err: &CommerceError, message: &str) {
    match err.kind() {
        ErrorKind::Internal => error!(error = %err, code = err.code(), "{message}"),
        ErrorKind::Unavailable => warn!(error = %err, code = err.code(), "{message}"),
        _ => debug!(error = %err, code = err.code(), "{message}"),
    }
}

fn log_outcome<T>(result: &Result<T, CommerceError>, message: &str) {
    match result {
        Ok(_) => info!("{message}"),
        Err(err) => log_rejection(err, "operation rejected, nothing was written"),
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
