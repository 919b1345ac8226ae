//! Transactional outbox.
//!
//! Side effects other services care about are written as events in the
//! same unit of work as the state change that caused them. A relay drains
//! them after commit, so an event exists if and only if its change does.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shop_db::{Db, Tx};

use crate::ids::EventId;
use crate::CommerceError;

/// Event topics.
pub mod topics {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";
    pub const PAYMENT_STATUS_CHANGED: &str = "payment.status_changed";
    pub const PAYMENT_REFUNDED: &str = "payment.refunded";
    pub const VOUCHER_REDEEMED: &str = "voucher.redeemed";
}

/// A pending event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEvent {
    pub id: EventId,
    /// Position in the outbox, increasing across commits.
    pub seq: u64,
    pub topic: String,
    pub aggregate_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sequence {
    next: u64,
}

/// Access to the outbox collection.
pub struct Outbox;

impl Outbox {
    pub const COLLECTION: &'static str = "outbox";
    const SEQUENCE_COLLECTION: &'static str = "outbox_seq";
    const SEQUENCE_ID: &'static str = "outbox";

    /// Stage an event in the caller's unit of work.
    pub fn append<P: Serialize>(
        tx: &mut Tx,
        topic: &str,
        aggregate_id: &str,
        payload: &P,
    ) -> Result<OutboxEvent, CommerceError> {
        let mut sequence: Sequence = tx
            .get(Self::SEQUENCE_COLLECTION, Self::SEQUENCE_ID)?
            .unwrap_or_default();
        let seq = sequence.next;
        sequence.next += 1;
        tx.put(Self::SEQUENCE_COLLECTION, Self::SEQUENCE_ID, &sequence)?;

        let event = OutboxEvent {
            id: EventId::generate(),
            seq,
            topic: topic.to_string(),
            aggregate_id: aggregate_id.to_string(),
            payload: serde_json::to_value(payload)?,
            created_at: Utc::now(),
        };
        tx.insert(Self::COLLECTION, &Self::key(seq), &event)?;
        tracing::trace!(topic, aggregate_id, seq, "outbox event staged");
        Ok(event)
    }

    /// Events not yet acknowledged, oldest first.
    pub fn pending(tx: &Tx) -> Result<Vec<OutboxEvent>, CommerceError> {
        Ok(tx.find(Self::COLLECTION, |_: &OutboxEvent| true)?)
    }

    /// Up to `max` of the oldest pending events, left in place.
    pub async fn peek(db: &Db, max: usize) -> Result<Vec<OutboxEvent>, CommerceError> {
        let tx = db.begin().await?;
        Ok(Self::pending(&tx)?.into_iter().take(max).collect())
    }

    /// Remove delivered events. Unknown sequence numbers are ignored.
    pub async fn acknowledge(db: &Db, seqs: &[u64]) -> Result<usize, CommerceError> {
        if seqs.is_empty() {
            return Ok(0);
        }
        let mut tx = db.begin().await?;
        let mut removed = 0;
        for seq in seqs {
            if tx.delete(Self::COLLECTION, &Self::key(*seq))? {
                removed += 1;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    // Zero-padded so document order is sequence order.
    fn key(seq: u64) -> String {
        format!("{seq:020}")
    }
}

/// Destination for relayed events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), CommerceError>;
}

/// Publishes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), CommerceError> {
        tracing::info!(
            topic = %event.topic,
            aggregate_id = %event.aggregate_id,
            seq = event.seq,
            payload = %event.payload,
            "event published"
        );
        Ok(())
    }
}

/// Moves committed events from the outbox to a publisher.
///
/// Events are removed only after the publisher accepts them, so delivery is
/// at least once and in sequence order. A publish failure stops the batch;
/// the failed event and those after it are retried on the next pass.
///
/// # Example
///
/// ```rust,ignore
/// let relay = OutboxRelay::new(db.clone(), LogPublisher).with_batch_size(50);
/// tokio::spawn(relay.run(Duration::from_secs(1), shutdown_signal()));
/// ```
#[derive(Debug)]
pub struct OutboxRelay<P> {
    db: Db,
    publisher: P,
    batch_size: usize,
}

impl<P: EventPublisher> OutboxRelay<P> {
    pub fn new(db: Db, publisher: P) -> Self {
        Self {
            db,
            publisher,
            batch_size: 100,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish one batch. Returns how many events were delivered.
    pub async fn relay_once(&self) -> Result<usize, CommerceError> {
        let batch = Outbox::peek(&self.db, self.batch_size).await?;
        let mut delivered = Vec::with_capacity(batch.len());
        for event in &batch {
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(error = %err, seq = event.seq, topic = %event.topic, "event publish failed");
                break;
            }
            delivered.push(event.seq);
        }
        Outbox::acknowledge(&self.db, &delivered).await?;
        Ok(delivered.len())
    }

    /// Relay every `interval` until `shutdown` resolves, then flush once more.
    pub async fn run(self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.relay_pending().await,
            }
        }
        self.relay_pending().await;
        tracing::debug!("outbox relay stopped");
    }

    async fn relay_pending(&self) {
        loop {
            match self.relay_once().await {
                Ok(n) if n == self.batch_size => continue,
                Ok(_) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "outbox relay pass failed");
                    break;
                }
            }
        }
    }
}
