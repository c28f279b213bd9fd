use super::money::{Amount, Balance, Currency};
use super::transaction::{Metadata, TransactionId};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefundId(String);

impl RefundId {
    pub fn generate() -> Self {
        Self(format!("ref_{}", &Uuid::new_v4().simple().to_string()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RefundId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RefundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RefundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RefundStatus::Completed | RefundStatus::Failed | RefundStatus::Cancelled
        )
    }

    /// Whether a refund in this status counts against the refundable balance.
    pub fn holds_balance(self) -> bool {
        matches!(
            self,
            RefundStatus::Pending | RefundStatus::Processing | RefundStatus::Completed
        )
    }

    pub fn can_transition_to(self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processing => "processing",
            RefundStatus::Completed => "completed",
            RefundStatus::Failed => "failed",
            RefundStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Refund {
    pub id: RefundId,
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub external_refund_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn pending(
        id: RefundId,
        transaction_id: TransactionId,
        amount: Amount,
        currency: Currency,
        reason: Option<String>,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            transaction_id,
            amount,
            currency,
            status: RefundStatus::Pending,
            reason,
            external_refund_id: None,
            metadata,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    /// Moves the refund along its state machine. `processed_at` is stamped on completion.
    pub fn transition_to(
        &mut self,
        next: RefundStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::IllegalTransition {
                entity: "Refund",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        if next == RefundStatus::Completed {
            self.processed_at = Some(now);
        }
        Ok(())
    }
}

/// Rejects `refund` when it would push the balance held by refunds of the same transaction
/// past `cap`. Failed and cancelled refunds release what they held.
///
/// Stores call this and insert the refund under one write lock.
pub fn ensure_within_cap<'a>(
    existing: impl IntoIterator<Item = &'a Refund>,
    refund: &Refund,
    cap: Amount,
) -> Result<(), PaymentError> {
    let held: Balance = existing
        .into_iter()
        .filter(|other| {
            other.transaction_id == refund.transaction_id && other.status.holds_balance()
        })
        .map(|other| Balance::from(other.amount))
        .sum();
    let remaining = Balance::from(cap) - held;
    if Balance::from(refund.amount) > remaining {
        return Err(PaymentError::ValidationError(format!(
            "Refund amount exceeds remaining refundable balance of {}",
            remaining.0
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundUpdate {
    pub status: Option<RefundStatus>,
    pub external_refund_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RefundUpdate {
    pub fn status(status: RefundStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, refund: &mut Refund, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            refund.status = status;
        }
        if let Some(external_refund_id) = &self.external_refund_id {
            refund.external_refund_id = Some(external_refund_id.clone());
        }
        if let Some(processed_at) = self.processed_at {
            refund.processed_at = Some(processed_at);
        }
        refund.updated_at = now;
    }
}
