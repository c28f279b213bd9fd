use super::audit::AuditLogEntry;
use super::card::{CardData, EncryptedCard};
use super::money::{Amount, Currency};
use super::refund::{Refund, RefundId, RefundUpdate};
use super::transaction::{Transaction, TransactionId, TransactionUpdate};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One write inside an all-or-nothing [`PaymentStore::run_batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    InsertTransaction(Transaction),
    UpdateTransaction(TransactionId, TransactionUpdate),
    InsertRefund(Refund),
    UpdateRefund(RefundId, RefundUpdate),
    AppendAudit(AuditLogEntry),
}

/// Durable storage for transactions, refunds and the audit trail.
///
/// Every call is its own short atomic write. Updating a missing row fails with
/// [`PaymentError::DatabaseError`](crate::error::PaymentError::DatabaseError).
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction>;
    async fn update_transaction(&self, id: &TransactionId, update: TransactionUpdate) -> Result<()>;
    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>>;
    async fn create_refund(&self, refund: Refund) -> Result<()>;
    /// Inserts `refund` only if the refunds holding balance on its transaction, plus this
    /// one, stay within `cap`. Check and insert are one atomic step, so concurrent refunds
    /// cannot both claim the same balance. See [`ensure_within_cap`].
    ///
    /// [`ensure_within_cap`]: super::refund::ensure_within_cap
    async fn create_refund_within_cap(&self, refund: Refund, cap: Amount) -> Result<()>;
    async fn update_refund(&self, id: &RefundId, update: RefundUpdate) -> Result<()>;
    async fn get_refund(&self, id: &RefundId) -> Result<Option<Refund>>;
    async fn list_refunds(&self, transaction_id: &TransactionId) -> Result<Vec<Refund>>;
    async fn append_audit(&self, entry: AuditLogEntry) -> Result<()>;
    /// Applies every op or none of them.
    async fn run_batch(&self, ops: Vec<StoreOp>) -> Result<()>;
    async fn health_check(&self) -> bool;
}

/// Result of an authorization attempt that reached the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Approved {
        authorization_id: String,
        message: Option<String>,
    },
    Declined {
        message: String,
        decline_code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub capture_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub external_refund_id: Option<String>,
    pub refunded: bool,
}

/// External authorize/capture/refund operations.
///
/// Business declines come back as values. Only transport-level faults use the error channel.
#[async_trait]
pub trait BankingGateway: Send + Sync {
    async fn authorize(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        currency: &Currency,
        card: Option<&CardData>,
        correlation_id: &str,
    ) -> std::result::Result<AuthorizationOutcome, GatewayError>;

    async fn capture(
        &self,
        authorization_id: &str,
        correlation_id: &str,
    ) -> std::result::Result<CaptureReceipt, GatewayError>;

    async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        correlation_id: &str,
    ) -> std::result::Result<RefundOutcome, GatewayError>;

    async fn health_check(&self) -> bool;
}

pub trait CardVault: Send + Sync {
    fn encrypt_card(&self, card: &CardData) -> Result<EncryptedCard>;
    fn decrypt_card(&self, blob: &EncryptedCard) -> Result<CardData>;
}

#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V, ttl: Duration);
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> bool;
}

/// Best-effort lifecycle event sink. Delivery problems stay inside the publisher.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        payload: serde_json::Value,
        key: Option<&str>,
    );

    async fn health_check(&self) -> bool {
        true
    }
}

pub type PaymentStoreBox = Arc<dyn PaymentStore>;
pub type BankingGatewayBox = Arc<dyn BankingGateway>;
pub type CardVaultBox = Arc<dyn CardVault>;
pub type CacheBox<V> = Arc<dyn Cache<V>>;
pub type EventPublisherBox = Arc<dyn EventPublisher>;
