use super::card::EncryptedCard;
use super::money::{Amount, Currency};
use crate::error::PaymentError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Free-form, string-keyed request metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Logical lifetime of a transaction before it is considered expired.
pub const TRANSACTION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(format!("txn_{}", &Uuid::new_v4().simple().to_string()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
    DigitalWallet,
}

impl PaymentMethod {
    pub fn requires_card(self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::DigitalWallet => "digital_wallet",
        }
    }
}

/// Transaction lifecycle.
///
/// ```text
/// pending ──> authorized ──> captured
///    │             │
///    └──> failed <─┘
/// ```
/// `cancelled` and `expired` are terminal states owned by external drivers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Authorized,
    Captured,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
        )
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Authorized, Captured)
                | (Authorized, Failed)
                | (Authorized, Cancelled)
                | (Authorized, Expired)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment as persisted by the store. The amount never changes after creation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub merchant_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub card_last_four: Option<String>,
    pub encrypted_card: Option<EncryptedCard>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub authorization_id: Option<String>,
    pub capture_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a new `pending` transaction expiring 24 hours after `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: TransactionId,
        merchant_id: String,
        amount: Amount,
        currency: Currency,
        payment_method: PaymentMethod,
        card_last_four: Option<String>,
        encrypted_card: Option<EncryptedCard>,
        description: Option<String>,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            merchant_id,
            amount,
            currency,
            payment_method,
            card_last_four,
            encrypted_card,
            description,
            metadata,
            authorization_id: None,
            capture_id: None,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(TRANSACTION_TTL_HOURS),
        }
    }

    /// Moves the transaction along the state machine, rejecting illegal edges.
    pub fn transition_to(
        &mut self,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::IllegalTransition {
                entity: "Transaction",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Partial update applied by [`PaymentStore::update_transaction`].
///
/// [`PaymentStore::update_transaction`]: super::ports::PaymentStore::update_transaction
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub status: Option<PaymentStatus>,
    pub authorization_id: Option<String>,
    pub capture_id: Option<String>,
}

impl TransactionUpdate {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, tx: &mut Transaction, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            tx.status = status;
        }
        if let Some(authorization_id) = &self.authorization_id {
            tx.authorization_id = Some(authorization_id.clone());
        }
        if let Some(capture_id) = &self.capture_id {
            tx.capture_id = Some(capture_id.clone());
        }
        tx.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(now: DateTime<Utc>) -> Transaction {
        Transaction::pending(
            TransactionId::generate(),
            "merchant_123".to_string(),
            Amount::new(dec!(99.99)).unwrap(),
            Currency::parse("USD").unwrap(),
            PaymentMethod::CreditCard,
            Some("1111".to_string()),
            None,
            None,
            Metadata::new(),
            now,
        )
    }

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert!(a.as_str().starts_with("txn_"));
        assert_eq!(a.as_str().len(), 20);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pending_transaction_expires_after_a_day() {
        let now = Utc::now();
        let tx = sample(now);
        assert_eq!(tx.status, PaymentStatus::Pending);
        assert_eq!(tx.expires_at - tx.created_at, Duration::hours(24));
        assert!(!tx.is_expired(now));
        assert!(tx.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_happy_path_transitions() {
        let now = Utc::now();
        let mut tx = sample(now);
        tx.transition_to(PaymentStatus::Authorized, now).unwrap();
        tx.transition_to(PaymentStatus::Captured, now).unwrap();
        assert!(tx.status.is_terminal());
    }

    #[test]
    fn test_cannot_skip_authorization() {
        let now = Utc::now();
        let mut tx = sample(now);
        let err = tx.transition_to(PaymentStatus::Captured, now).unwrap_err();
        assert!(matches!(err, PaymentError::IllegalTransition { .. }));
        assert_eq!(tx.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            PaymentStatus::Captured,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                PaymentStatus::Pending,
                PaymentStatus::Authorized,
                PaymentStatus::Captured,
                PaymentStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let now = Utc::now();
        let mut tx = sample(now);
        TransactionUpdate {
            authorization_id: Some("auth_1".to_string()),
            ..Default::default()
        }
        .apply(&mut tx, now);
        assert_eq!(tx.authorization_id.as_deref(), Some("auth_1"));
        assert_eq!(tx.status, PaymentStatus::Pending);
        assert_eq!(tx.amount, Amount::new(dec!(99.99)).unwrap());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Captured).unwrap(),
            "\"captured\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::DigitalWallet).unwrap(),
            "\"digital_wallet\""
        );
    }
}
