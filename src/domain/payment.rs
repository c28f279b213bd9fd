//! Inbound requests and the response snapshots handed back to adapters.

use super::card::CardData;
use super::money::{Amount, Currency};
use super::refund::{Refund, RefundId, RefundStatus};
use super::transaction::{Metadata, PaymentMethod, PaymentStatus, Transaction, TransactionId};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MERCHANT_ID_MIN_LEN: usize = 3;
pub const MERCHANT_ID_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 500;
pub const REFUND_REASON_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub merchant_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub card_data: Option<CardData>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A payment request whose shape has been checked. Merchant eligibility is checked separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    pub merchant_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub card_data: Option<CardData>,
    pub description: Option<String>,
    pub metadata: Metadata,
}

impl PaymentRequest {
    pub fn validate(self) -> Result<ValidatedPayment, PaymentError> {
        let amount = Amount::new(self.amount)?;
        let currency = match self.currency.as_deref() {
            Some(code) => Currency::parse(code)?,
            None => Currency::default(),
        };

        let card_data = self.card_data.map(CardData::validated).transpose()?;
        if self.payment_method.requires_card() && card_data.is_none() {
            return Err(PaymentError::ValidationError(format!(
                "Card data is required for {} payments",
                self.payment_method.as_str()
            )));
        }

        if let Some(description) = &self.description
            && description.chars().count() > DESCRIPTION_MAX_LEN
        {
            return Err(PaymentError::ValidationError(
                "Description cannot exceed 500 characters".to_string(),
            ));
        }

        Ok(ValidatedPayment {
            merchant_id: self.merchant_id.trim().to_string(),
            amount,
            currency,
            payment_method: self.payment_method,
            card_data,
            description: self.description,
            metadata: self.metadata,
        })
    }
}

/// Merchant eligibility check.
pub fn validate_merchant(merchant_id: &str) -> Result<(), PaymentError> {
    let len = merchant_id.chars().count();
    if !(MERCHANT_ID_MIN_LEN..=MERCHANT_ID_MAX_LEN).contains(&len) {
        return Err(PaymentError::ValidationError(
            "Invalid merchant ID".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRefund {
    pub amount: Option<Amount>,
    pub reason: Option<String>,
    pub metadata: Metadata,
}

impl RefundRequest {
    pub fn validate(self) -> Result<ValidatedRefund, PaymentError> {
        let amount = self.amount.map(Amount::new).transpose()?;
        if let Some(reason) = &self.reason
            && reason.chars().count() > REFUND_REASON_MAX_LEN
        {
            return Err(PaymentError::ValidationError(
                "Refund reason cannot exceed 100 characters".to_string(),
            ));
        }
        Ok(ValidatedRefund {
            amount,
            reason: self.reason,
            metadata: self.metadata,
        })
    }
}

/// Snapshot of a transaction returned by `process_payment` and `get_payment_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub transaction_id: TransactionId,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub card_last_four: Option<String>,
    pub authorization_id: Option<String>,
    pub capture_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for PaymentResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            status: tx.status,
            amount: tx.amount,
            currency: tx.currency.clone(),
            payment_method: tx.payment_method,
            card_last_four: tx.card_last_four.clone(),
            authorization_id: tx.authorization_id.clone(),
            capture_id: tx.capture_id.clone(),
            description: tx.description.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            expires_at: Some(tx.expires_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund_id: RefundId,
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub external_refund_id: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&Refund> for RefundResponse {
    fn from(refund: &Refund) -> Self {
        Self {
            refund_id: refund.id.clone(),
            transaction_id: refund.transaction_id.clone(),
            amount: refund.amount,
            currency: refund.currency.clone(),
            status: refund.status,
            reason: refund.reason.clone(),
            external_refund_id: refund.external_refund_id.clone(),
            metadata: refund.metadata.clone(),
            created_at: refund.created_at,
            updated_at: refund.updated_at,
            processed_at: refund.processed_at,
        }
    }
}
