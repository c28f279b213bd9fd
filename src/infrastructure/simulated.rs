use crate::domain::card::CardData;
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::{AuthorizationOutcome, BankingGateway, CaptureReceipt, RefundOutcome};
use crate::domain::transaction::TransactionId;
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Card number suffix the simulated bank declines by default.
pub const DEFAULT_DECLINE_SUFFIX: &str = "0002";

fn short_id(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

/// Deterministic in-process bank.
///
/// Approves everything except cards ending in the decline suffix. Faults can be injected
/// to exercise retries, timeouts and compensation.
#[derive(Debug)]
pub struct SimulatedBankingGateway {
    decline_suffix: Option<String>,
    latency: Duration,
    pending_authorize_faults: AtomicU32,
    fail_captures: AtomicBool,
    reject_refunds: AtomicBool,
    healthy: AtomicBool,
    authorize_calls: AtomicU32,
    capture_calls: AtomicU32,
    refund_calls: AtomicU32,
}

impl Default for SimulatedBankingGateway {
    fn default() -> Self {
        Self {
            decline_suffix: Some(DEFAULT_DECLINE_SUFFIX.to_string()),
            latency: Duration::ZERO,
            pending_authorize_faults: AtomicU32::new(0),
            fail_captures: AtomicBool::new(false),
            reject_refunds: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            authorize_calls: AtomicU32::new(0),
            capture_calls: AtomicU32::new(0),
            refund_calls: AtomicU32::new(0),
        }
    }
}

impl SimulatedBankingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decline_suffix(mut self, suffix: Option<String>) -> Self {
        self.decline_suffix = suffix;
        self
    }

    /// Delay applied to every call before it answers.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The next `count` authorize calls fail with a transport error.
    pub fn fail_next_authorizations(&self, count: u32) {
        self.pending_authorize_faults.store(count, Ordering::SeqCst);
    }

    pub fn fail_captures(&self, fail: bool) {
        self.fail_captures.store(fail, Ordering::SeqCst);
    }

    /// Makes the bank answer refunds without confirming them.
    pub fn reject_refunds(&self, reject: bool) {
        self.reject_refunds.store(reject, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn authorize_calls(&self) -> u32 {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> u32 {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn declines(&self, card: Option<&CardData>) -> bool {
        match (&self.decline_suffix, card) {
            (Some(suffix), Some(card)) => card.card_number.ends_with(suffix.as_str()),
            _ => false,
        }
    }
}

#[async_trait]
impl BankingGateway for SimulatedBankingGateway {
    async fn authorize(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        _currency: &Currency,
        card: Option<&CardData>,
        _correlation_id: &str,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let faulted = self
            .pending_authorize_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if faulted {
            warn!(%transaction_id, "simulated bank dropped the connection");
            return Err(GatewayError::Transport("connection reset by peer".to_string()));
        }

        if self.declines(card) {
            return Ok(AuthorizationOutcome::Declined {
                message: "Insufficient funds".to_string(),
                decline_code: Some("insufficient_funds".to_string()),
            });
        }

        debug!(%transaction_id, %amount, "simulated bank approved");
        Ok(AuthorizationOutcome::Approved {
            authorization_id: short_id("auth"),
            message: Some("Approved".to_string()),
        })
    }

    async fn capture(
        &self,
        _authorization_id: &str,
        _correlation_id: &str,
    ) -> Result<CaptureReceipt, GatewayError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(GatewayError::UnexpectedStatus {
                status: 500,
                body: "capture unavailable".to_string(),
            });
        }
        Ok(CaptureReceipt {
            capture_id: short_id("cap"),
        })
    }

    async fn refund(
        &self,
        _transaction_id: &TransactionId,
        _amount: Amount,
        _correlation_id: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.reject_refunds.load(Ordering::SeqCst) {
            return Ok(RefundOutcome {
                external_refund_id: None,
                refunded: false,
            });
        }
        Ok(RefundOutcome {
            external_refund_id: Some(short_id("bank_ref")),
            refunded: true,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
