use super::retry::RetryPolicy;
use crate::domain::audit::AuditLogEntry;
use crate::domain::card::CardData;
use crate::domain::money::Amount;
use crate::domain::payment::{
    PaymentRequest, PaymentResponse, RefundRequest, RefundResponse, ValidatedPayment,
    validate_merchant,
};
use crate::domain::ports::{
    AuthorizationOutcome, BankingGatewayBox, CacheBox, CardVaultBox, EventPublisherBox,
    PaymentStoreBox, StoreOp,
};
use crate::domain::refund::{Refund, RefundId, RefundStatus, RefundUpdate};
use crate::domain::transaction::{
    PaymentStatus, TRANSACTION_TTL_HOURS, Transaction, TransactionId, TransactionUpdate,
};
use crate::error::{GatewayError, PaymentError, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Span, debug, error, info, instrument, warn};

pub const DEFAULT_EVENT_TOPIC: &str = "payment-events";
pub const PAYMENT_STATUS_CHANGED: &str = "payment_status_changed";
pub const REFUND_STATUS_CHANGED: &str = "refund_status_changed";

/// Cache key under which a transaction's status snapshot is memoized.
pub fn status_cache_key(transaction_id: &TransactionId) -> String {
    format!("payment_status:{}", transaction_id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound for a single gateway call.
    pub gateway_timeout: Duration,
    pub authorize_retry: RetryPolicy,
    pub status_cache_ttl: Duration,
    pub transaction_ttl: chrono::Duration,
    pub event_topic: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
            authorize_retry: RetryPolicy::default(),
            status_cache_ttl: Duration::from_secs(300),
            transaction_ttl: chrono::Duration::hours(TRANSACTION_TTL_HOURS),
            event_topic: DEFAULT_EVENT_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub database: bool,
    pub banking_service: bool,
    pub event_service: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub services: ServiceHealth,
    pub checked_at: chrono::DateTime<Utc>,
}

/// Drives payments and refunds through their state machines.
///
/// Collaborators are injected once at construction. No lock is held across a workflow:
/// each store call is its own atomic write, so concurrent readers may observe
/// intermediate states such as `pending` or `authorized`.
pub struct PaymentOrchestrator {
    store: PaymentStoreBox,
    gateway: BankingGatewayBox,
    vault: CardVaultBox,
    cache: CacheBox<PaymentResponse>,
    events: EventPublisherBox,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        store: PaymentStoreBox,
        gateway: BankingGatewayBox,
        vault: CardVaultBox,
        cache: CacheBox<PaymentResponse>,
        events: EventPublisherBox,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            vault,
            cache,
            events,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates, authorizes and captures a payment.
    ///
    /// Input and merchant validation failures are returned as-is before anything is
    /// written. Any later failure force-fails the persisted transaction and is wrapped in
    /// [`PaymentError::PaymentProcessing`].
    #[instrument(
        skip(self, request),
        fields(merchant_id = %request.merchant_id, transaction_id)
    )]
    pub async fn process_payment(
        &self,
        request: PaymentRequest,
        correlation_id: &str,
    ) -> Result<PaymentResponse> {
        let payment = request.validate()?;
        let transaction_id = TransactionId::generate();
        Span::current().record("transaction_id", transaction_id.as_str());

        validate_merchant(&payment.merchant_id)?;

        let mut persisted = false;
        match self
            .run_payment(&transaction_id, payment, correlation_id, &mut persisted)
            .await
        {
            Ok(response) => {
                metrics::counter!("payments_processed_total", "status" => response.status.as_str())
                    .increment(1);
                info!(status = %response.status, "payment processed");
                Ok(response)
            }
            Err(err) => {
                metrics::counter!("payments_failed_total", "error" => err.label()).increment(1);
                error!(error = %err, persisted, "payment processing failed");
                if persisted {
                    self.compensate_payment(&transaction_id, &err, correlation_id)
                        .await;
                }
                Err(PaymentError::PaymentProcessing {
                    transaction_id: persisted.then_some(transaction_id),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn run_payment(
        &self,
        transaction_id: &TransactionId,
        payment: ValidatedPayment,
        correlation_id: &str,
        persisted: &mut bool,
    ) -> Result<PaymentResponse> {
        let (card_last_four, encrypted_card) = match &payment.card_data {
            Some(card) => (Some(card.last_four()), Some(self.vault.encrypt_card(card)?)),
            None => (None, None),
        };

        let now = Utc::now();
        let mut tx = Transaction::pending(
            transaction_id.clone(),
            payment.merchant_id,
            payment.amount,
            payment.currency,
            payment.payment_method,
            card_last_four,
            encrypted_card,
            payment.description,
            payment.metadata,
            now,
        );
        tx.expires_at = now + self.config.transaction_ttl;
        let mut tx = self.store.create_transaction(tx).await?;
        *persisted = true;
        debug!("transaction persisted as pending");

        match self
            .authorize(&tx, payment.card_data.as_ref(), correlation_id)
            .await?
        {
            AuthorizationOutcome::Approved {
                authorization_id, ..
            } => {
                tx.transition_to(PaymentStatus::Authorized, Utc::now())?;
                tx.authorization_id = Some(authorization_id.clone());
                self.write_transaction(
                    &tx.id,
                    TransactionUpdate {
                        status: Some(PaymentStatus::Authorized),
                        authorization_id: Some(authorization_id.clone()),
                        capture_id: None,
                    },
                )
                .await?;
                debug!(%authorization_id, "payment authorized");

                let receipt = self
                    .with_timeout(self.gateway.capture(&authorization_id, correlation_id))
                    .await
                    .map_err(|source| PaymentError::ExternalService {
                        operation: "capture",
                        source,
                    })?;

                tx.transition_to(PaymentStatus::Captured, Utc::now())?;
                tx.capture_id = Some(receipt.capture_id.clone());
                self.write_transaction(
                    &tx.id,
                    TransactionUpdate {
                        status: Some(PaymentStatus::Captured),
                        authorization_id: None,
                        capture_id: Some(receipt.capture_id),
                    },
                )
                .await?;
            }
            AuthorizationOutcome::Declined {
                message,
                decline_code,
            } => {
                warn!(%message, decline_code = decline_code.as_deref(), "payment declined");
                tx.transition_to(PaymentStatus::Failed, Utc::now())?;
                self.write_transaction(&tx.id, TransactionUpdate::status(PaymentStatus::Failed))
                    .await?;
            }
        }

        self.events
            .publish(
                &self.config.event_topic,
                PAYMENT_STATUS_CHANGED,
                json!({
                    "transaction_id": tx.id,
                    "status": tx.status,
                    "timestamp": Utc::now(),
                    "correlation_id": correlation_id,
                }),
                Some(tx.id.as_str()),
            )
            .await;

        self.store
            .append_audit(AuditLogEntry::new(
                Some(tx.id.clone()),
                "payment_created",
                json!({
                    "merchant_id": tx.merchant_id,
                    "amount": tx.amount.to_string(),
                    "status": tx.status,
                }),
                correlation_id,
            ))
            .await?;

        Ok(PaymentResponse::from(&tx))
    }

    async fn authorize(
        &self,
        tx: &Transaction,
        card: Option<&CardData>,
        correlation_id: &str,
    ) -> Result<AuthorizationOutcome> {
        let gateway = &self.gateway;
        self.config
            .authorize_retry
            .run("authorize", move || {
                self.with_timeout(gateway.authorize(
                    &tx.id,
                    tx.amount,
                    &tx.currency,
                    card,
                    correlation_id,
                ))
            })
            .await
            .map_err(|source| PaymentError::ExternalService {
                operation: "authorize",
                source,
            })
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, GatewayError>>,
    ) -> std::result::Result<T, GatewayError> {
        let limit = self.config.gateway_timeout;
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        }
    }

    /// Persists a status write and drops the now stale status snapshot.
    async fn write_transaction(&self, id: &TransactionId, update: TransactionUpdate) -> Result<()> {
        self.store.update_transaction(id, update).await?;
        self.evict_status(id).await;
        Ok(())
    }

    async fn evict_status(&self, id: &TransactionId) {
        if self.cache.delete(&status_cache_key(id)).await {
            debug!(transaction_id = %id, "evicted cached status");
        }
    }

    /// Force-fails a transaction left mid-workflow. Terminal transactions are left untouched.
    async fn compensate_payment(
        &self,
        transaction_id: &TransactionId,
        cause: &PaymentError,
        correlation_id: &str,
    ) {
        match self.store.get_transaction(transaction_id).await {
            Ok(Some(tx)) if tx.status.is_terminal() => {
                warn!(status = %tx.status, "transaction already terminal, skipping compensation");
                return;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "could not read transaction before compensation"),
        }

        let ops = vec![
            StoreOp::UpdateTransaction(
                transaction_id.clone(),
                TransactionUpdate::status(PaymentStatus::Failed),
            ),
            StoreOp::AppendAudit(AuditLogEntry::new(
                Some(transaction_id.clone()),
                "payment_failed",
                json!({ "error": cause.to_string(), "error_kind": cause.label() }),
                correlation_id,
            )),
        ];
        match self.store.run_batch(ops).await {
            Ok(()) => info!("transaction marked failed"),
            Err(err) => error!(error = %err, "compensating write failed"),
        }
        self.evict_status(transaction_id).await;
    }

    /// Status lookup served from the cache when possible.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get_payment_status(
        &self,
        transaction_id: &TransactionId,
        correlation_id: &str,
    ) -> Result<PaymentResponse> {
        let key = status_cache_key(transaction_id);
        if let Some(cached) = self.cache.get(&key).await {
            debug!("status served from cache");
            return Ok(cached);
        }

        let tx = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.clone()))?;
        let response = PaymentResponse::from(&tx);
        self.cache
            .set(&key, response.clone(), self.config.status_cache_ttl)
            .await;
        Ok(response)
    }

    /// Refunds part or all of a captured transaction.
    ///
    /// Pending, processing and completed refunds together never exceed the transaction
    /// amount. Without an explicit amount the full transaction amount is refunded, which
    /// fails once any balance is already held.
    #[instrument(
        skip(self, request),
        fields(transaction_id = %transaction_id, refund_id)
    )]
    pub async fn process_refund(
        &self,
        transaction_id: &TransactionId,
        request: RefundRequest,
        correlation_id: &str,
    ) -> Result<RefundResponse> {
        let request = request.validate()?;
        let tx = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.clone()))?;

        if tx.status != PaymentStatus::Captured {
            return Err(PaymentError::InvalidTransactionState {
                transaction_id: tx.id.clone(),
                current: tx.status,
                required: PaymentStatus::Captured,
            });
        }

        let amount = resolve_refund_amount(&tx, request.amount)?;
        let refund_id = RefundId::generate();
        Span::current().record("refund_id", refund_id.as_str());

        // Reserving the balance and inserting the pending refund happen together in the store.
        let refund = Refund::pending(
            refund_id.clone(),
            tx.id.clone(),
            amount,
            tx.currency.clone(),
            request.reason,
            request.metadata,
            Utc::now(),
        );
        self.store
            .create_refund_within_cap(refund.clone(), tx.amount)
            .await?;
        debug!(%amount, "refund persisted as pending");

        match self.run_refund(&tx, refund, correlation_id).await {
            Ok(response) => {
                metrics::counter!("refunds_processed_total", "status" => response.status.as_str())
                    .increment(1);
                info!(status = %response.status, amount = %response.amount, "refund processed");
                Ok(response)
            }
            Err(err) => {
                metrics::counter!("refunds_failed_total", "error" => err.label()).increment(1);
                error!(error = %err, "refund processing failed");
                self.compensate_refund(&refund_id, &tx.id, &err, correlation_id)
                    .await;
                Err(PaymentError::RefundProcessing {
                    refund_id,
                    transaction_id: tx.id,
                    source: Box::new(err),
                })
            }
        }
    }

    async fn run_refund(
        &self,
        tx: &Transaction,
        mut refund: Refund,
        correlation_id: &str,
    ) -> Result<RefundResponse> {
        let amount = refund.amount;
        let outcome = self
            .with_timeout(self.gateway.refund(&tx.id, amount, correlation_id))
            .await
            .map_err(|source| PaymentError::ExternalService {
                operation: "refund",
                source,
            })?;

        let status = if outcome.refunded {
            RefundStatus::Completed
        } else {
            warn!("gateway did not confirm the refund");
            RefundStatus::Failed
        };
        refund.transition_to(status, Utc::now())?;
        refund.external_refund_id = outcome.external_refund_id.clone();
        self.store
            .update_refund(
                &refund.id,
                RefundUpdate {
                    status: Some(status),
                    external_refund_id: outcome.external_refund_id,
                    processed_at: refund.processed_at,
                },
            )
            .await?;

        self.events
            .publish(
                &self.config.event_topic,
                REFUND_STATUS_CHANGED,
                json!({
                    "refund_id": refund.id,
                    "status": refund.status,
                    "timestamp": Utc::now(),
                    "correlation_id": correlation_id,
                }),
                Some(tx.id.as_str()),
            )
            .await;

        self.store
            .append_audit(AuditLogEntry::new(
                Some(tx.id.clone()),
                "refund_created",
                json!({
                    "refund_id": refund.id,
                    "amount": refund.amount.to_string(),
                    "status": refund.status,
                }),
                correlation_id,
            ))
            .await?;

        Ok(RefundResponse::from(&refund))
    }

    async fn compensate_refund(
        &self,
        refund_id: &RefundId,
        transaction_id: &TransactionId,
        cause: &PaymentError,
        correlation_id: &str,
    ) {
        match self.store.get_refund(refund_id).await {
            Ok(Some(refund)) if refund.status.is_terminal() => {
                warn!(status = %refund.status, "refund already terminal, skipping compensation");
                return;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "could not read refund before compensation"),
        }

        let ops = vec![
            StoreOp::UpdateRefund(refund_id.clone(), RefundUpdate::status(RefundStatus::Failed)),
            StoreOp::AppendAudit(AuditLogEntry::new(
                Some(transaction_id.clone()),
                "refund_failed",
                json!({
                    "refund_id": refund_id,
                    "error": cause.to_string(),
                    "error_kind": cause.label(),
                }),
                correlation_id,
            )),
        ];
        match self.store.run_batch(ops).await {
            Ok(()) => info!("refund marked failed"),
            Err(err) => error!(error = %err, "compensating write failed"),
        }
    }

    /// Aggregated health of the store, the banking gateway and the event publisher.
    pub async fn health_check(&self) -> HealthReport {
        let limit = self.config.gateway_timeout;
        let (database, banking_service, event_service) = tokio::join!(
            self.store.health_check(),
            async {
                timeout(limit, self.gateway.health_check())
                    .await
                    .unwrap_or(false)
            },
            self.events.health_check(),
        );
        let services = ServiceHealth {
            database,
            banking_service,
            event_service,
        };
        let status = if database && banking_service && event_service {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services,
            checked_at: Utc::now(),
        }
    }
}

fn resolve_refund_amount(tx: &Transaction, requested: Option<Amount>) -> Result<Amount> {
    match requested {
        Some(amount) if amount > tx.amount => Err(PaymentError::ValidationError(
            "Refund amount cannot exceed original transaction amount".to_string(),
        )),
        Some(amount) => Ok(amount),
        None => Ok(tx.amount),
    }
}
