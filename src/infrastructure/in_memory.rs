use crate::domain::audit::AuditLogEntry;
use crate::domain::money::Amount;
use crate::domain::ports::{EventPublisher, PaymentStore, StoreOp};
use crate::domain::refund::{Refund, RefundId, RefundUpdate, ensure_within_cap};
use crate::domain::transaction::{Transaction, TransactionId, TransactionUpdate};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    transactions: HashMap<TransactionId, Transaction>,
    refunds: HashMap<RefundId, Refund>,
    audit: Vec<AuditLogEntry>,
}

impl Tables {
    /// Rejects a batch that would fail halfway, so `apply` can run unchecked afterwards.
    fn check(&self, ops: &[StoreOp]) -> Result<()> {
        let mut new_transactions = HashSet::new();
        let mut new_refunds = HashSet::new();
        for op in ops {
            match op {
                StoreOp::InsertTransaction(tx) => {
                    if self.transactions.contains_key(&tx.id) || !new_transactions.insert(&tx.id) {
                        return Err(duplicate("transaction", tx.id.as_str()));
                    }
                }
                StoreOp::UpdateTransaction(id, _) => {
                    if !self.transactions.contains_key(id) && !new_transactions.contains(id) {
                        return Err(missing("transaction", id.as_str()));
                    }
                }
                StoreOp::InsertRefund(refund) => {
                    if self.refunds.contains_key(&refund.id) || !new_refunds.insert(&refund.id) {
                        return Err(duplicate("refund", refund.id.as_str()));
                    }
                }
                StoreOp::UpdateRefund(id, _) => {
                    if !self.refunds.contains_key(id) && !new_refunds.contains(id) {
                        return Err(missing("refund", id.as_str()));
                    }
                }
                StoreOp::AppendAudit(_) => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: StoreOp) -> Result<()> {
        let now = Utc::now();
        match op {
            StoreOp::InsertTransaction(tx) => {
                if self.transactions.contains_key(&tx.id) {
                    return Err(duplicate("transaction", tx.id.as_str()));
                }
                self.transactions.insert(tx.id.clone(), tx);
            }
            StoreOp::UpdateTransaction(id, update) => {
                let tx = self
                    .transactions
                    .get_mut(&id)
                    .ok_or_else(|| missing("transaction", id.as_str()))?;
                update.apply(tx, now);
            }
            StoreOp::InsertRefund(refund) => {
                if self.refunds.contains_key(&refund.id) {
                    return Err(duplicate("refund", refund.id.as_str()));
                }
                self.refunds.insert(refund.id.clone(), refund);
            }
            StoreOp::UpdateRefund(id, update) => {
                let refund = self
                    .refunds
                    .get_mut(&id)
                    .ok_or_else(|| missing("refund", id.as_str()))?;
                update.apply(refund, now);
            }
            StoreOp::AppendAudit(entry) => self.audit.push(entry),
        }
        Ok(())
    }
}

fn duplicate(entity: &str, id: &str) -> PaymentError {
    PaymentError::DatabaseError(format!("{} {} already exists", entity, id))
}

fn missing(entity: &str, id: &str) -> PaymentError {
    PaymentError::DatabaseError(format!("{} {} does not exist", entity, id))
}

/// A thread-safe in-memory payment store.
///
/// All three tables sit behind one `RwLock`, which makes every call and every batch
/// atomic. Ideal for tests and single-process runs where durability is not required.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail in insertion order.
    pub async fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.tables.read().await.audit.clone()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction> {
        let mut tables = self.tables.write().await;
        tables.apply(StoreOp::InsertTransaction(tx.clone()))?;
        Ok(tx)
    }

    async fn update_transaction(
        &self,
        id: &TransactionId,
        update: TransactionUpdate,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.apply(StoreOp::UpdateTransaction(id.clone(), update))
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(id).cloned())
    }

    async fn create_refund(&self, refund: Refund) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.apply(StoreOp::InsertRefund(refund))
    }

    async fn create_refund_within_cap(&self, refund: Refund, cap: Amount) -> Result<()> {
        let mut tables = self.tables.write().await;
        ensure_within_cap(tables.refunds.values(), &refund, cap)?;
        tables.apply(StoreOp::InsertRefund(refund))
    }

    async fn update_refund(&self, id: &RefundId, update: RefundUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.apply(StoreOp::UpdateRefund(id.clone(), update))
    }

    async fn get_refund(&self, id: &RefundId) -> Result<Option<Refund>> {
        let tables = self.tables.read().await;
        Ok(tables.refunds.get(id).cloned())
    }

    async fn list_refunds(&self, transaction_id: &TransactionId) -> Result<Vec<Refund>> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<Refund> = tables
            .refunds
            .values()
            .filter(|refund| &refund.transaction_id == transaction_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|refund| refund.created_at);
        Ok(refunds)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.apply(StoreOp::AppendAudit(entry))
    }

    async fn run_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check(&ops)?;
        for op in ops {
            tables.apply(op)?;
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// An event captured by [`InMemoryEventPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub key: Option<String>,
}

/// Records every published event for later inspection.
#[derive(Default, Clone)]
pub struct InMemoryEventPublisher {
    events: Arc<RwLock<Vec<PublishedEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        payload: serde_json::Value,
        key: Option<&str>,
    ) {
        self.events.write().await.push(PublishedEvent {
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            key: key.map(str::to_string),
        });
    }
}
