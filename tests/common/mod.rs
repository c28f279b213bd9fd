#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use payment_orchestrator::application::orchestrator::{OrchestratorConfig, PaymentOrchestrator};
use payment_orchestrator::application::retry::RetryPolicy;
use payment_orchestrator::domain::audit::AuditLogEntry;
use payment_orchestrator::domain::card::CardData;
use payment_orchestrator::domain::money::Amount;
use payment_orchestrator::domain::payment::{PaymentRequest, PaymentResponse};
use payment_orchestrator::domain::ports::{PaymentStore, StoreOp};
use payment_orchestrator::domain::refund::{Refund, RefundId, RefundUpdate};
use payment_orchestrator::domain::transaction::{
    Metadata, PaymentMethod, Transaction, TransactionId, TransactionUpdate,
};
use payment_orchestrator::error::{PaymentError, Result};
use payment_orchestrator::infrastructure::cache::TtlCache;
use payment_orchestrator::infrastructure::encryption::AesCardVault;
use payment_orchestrator::infrastructure::in_memory::{InMemoryEventPublisher, InMemoryPaymentStore};
use payment_orchestrator::infrastructure::simulated::SimulatedBankingGateway;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const ENCRYPTION_KEY: &str = "integration-test-key";

pub fn card(number: &str) -> CardData {
    CardData {
        card_number: number.to_string(),
        expiry_month: 12,
        expiry_year: Utc::now().year() + 3,
        cvv: "123".to_string(),
        cardholder_name: "John Doe".to_string(),
    }
}

pub fn card_payment(amount: Decimal, card_number: &str) -> PaymentRequest {
    PaymentRequest {
        merchant_id: "merchant_123".to_string(),
        amount,
        currency: Some("USD".to_string()),
        payment_method: PaymentMethod::CreditCard,
        card_data: Some(card(card_number)),
        description: Some("Test payment".to_string()),
        metadata: Metadata::new(),
    }
}

/// In-memory store that counts calls and can be told to fail specific writes.
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: InMemoryPaymentStore,
    transaction_reads: AtomicUsize,
    writes: AtomicUsize,
    pub fail_audit: AtomicBool,
    pub fail_refund_updates: AtomicBool,
    pub fail_batches: AtomicBool,
}

impl InstrumentedStore {
    pub fn transaction_reads(&self) -> usize {
        self.transaction_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self, fail: &AtomicBool, what: &str) -> Result<()> {
        if fail.load(Ordering::SeqCst) {
            return Err(PaymentError::DatabaseError(format!("{} rejected", what)));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InstrumentedStore {
    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.create_transaction(tx).await
    }

    async fn update_transaction(
        &self,
        id: &TransactionId,
        update: TransactionUpdate,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_transaction(id, update).await
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.transaction_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_transaction(id).await
    }

    async fn create_refund(&self, refund: Refund) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.create_refund(refund).await
    }

    async fn create_refund_within_cap(&self, refund: Refund, cap: Amount) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.create_refund_within_cap(refund, cap).await
    }

    async fn update_refund(&self, id: &RefundId, update: RefundUpdate) -> Result<()> {
        self.write(&self.fail_refund_updates, "refund update")?;
        self.inner.update_refund(id, update).await
    }

    async fn get_refund(&self, id: &RefundId) -> Result<Option<Refund>> {
        self.inner.get_refund(id).await
    }

    async fn list_refunds(&self, transaction_id: &TransactionId) -> Result<Vec<Refund>> {
        self.inner.list_refunds(transaction_id).await
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<()> {
        self.write(&self.fail_audit, "audit entry")?;
        self.inner.append_audit(entry).await
    }

    async fn run_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        self.write(&self.fail_batches, "batch")?;
        self.inner.run_batch(ops).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

/// An orchestrator wired to in-memory collaborators the test can inspect.
pub struct Harness {
    pub store: Arc<InstrumentedStore>,
    pub gateway: Arc<SimulatedBankingGateway>,
    pub events: InMemoryEventPublisher,
    pub vault: Arc<AesCardVault>,
    pub cache: Arc<TtlCache<PaymentResponse>>,
    pub orchestrator: PaymentOrchestrator,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        authorize_retry: RetryPolicy::quick(),
        ..OrchestratorConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(SimulatedBankingGateway::new(), test_config())
    }

    pub fn with(gateway: SimulatedBankingGateway, config: OrchestratorConfig) -> Self {
        let store = Arc::new(InstrumentedStore::default());
        let gateway = Arc::new(gateway);
        let events = InMemoryEventPublisher::new();
        let vault = Arc::new(AesCardVault::new(ENCRYPTION_KEY).unwrap());
        let cache = Arc::new(TtlCache::new(100));
        let orchestrator = PaymentOrchestrator::new(
            store.clone(),
            gateway.clone(),
            vault.clone(),
            cache.clone(),
            Arc::new(events.clone()),
            config,
        );
        Self {
            store,
            gateway,
            events,
            vault,
            cache,
            orchestrator,
        }
    }

    pub async fn stored(&self, id: &TransactionId) -> Transaction {
        self.store.inner.get_transaction(id).await.unwrap().unwrap()
    }

    pub async fn audit_types(&self) -> Vec<String> {
        self.store
            .inner
            .audit_log()
            .await
            .into_iter()
            .map(|entry| entry.event_type)
            .collect()
    }
}
