use crate::domain::card::CardData;
use crate::domain::payment::{PaymentRequest, RefundRequest};
use crate::domain::transaction::{Metadata, PaymentMethod};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Payment,
    Refund,
    Status,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Payment => "payment",
            RecordKind::Refund => "refund",
            RecordKind::Status => "status",
        }
    }
}

/// One input row. Which columns matter depends on `type`.
///
/// `refund` and `status` rows point at an earlier `payment` row through `reference`,
/// or at a transaction id directly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub reference: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub expiry_month: Option<u32>,
    #[serde(default)]
    pub expiry_year: Option<i32>,
    #[serde(default)]
    pub cvv: Option<String>,
    #[serde(default)]
    pub cardholder_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

fn required<T>(value: Option<T>, column: &str) -> Result<T> {
    value.ok_or_else(|| PaymentError::ValidationError(format!("{} is required", column)))
}

impl PaymentRecord {
    pub fn to_payment_request(&self) -> Result<PaymentRequest> {
        let card_data = match &self.card_number {
            Some(card_number) => Some(CardData {
                card_number: card_number.clone(),
                expiry_month: required(self.expiry_month, "expiry_month")?,
                expiry_year: required(self.expiry_year, "expiry_year")?,
                cvv: required(self.cvv.clone(), "cvv")?,
                cardholder_name: required(self.cardholder_name.clone(), "cardholder_name")?,
            }),
            None => None,
        };

        Ok(PaymentRequest {
            merchant_id: required(self.merchant_id.clone(), "merchant_id")?,
            amount: required(self.amount, "amount")?,
            currency: self.currency.clone(),
            payment_method: required(self.payment_method, "payment_method")?,
            card_data,
            description: self.description.clone(),
            metadata: Metadata::new(),
        })
    }

    pub fn to_refund_request(&self) -> RefundRequest {
        RefundRequest {
            amount: self.amount,
            reason: self.reason.clone(),
            metadata: Metadata::new(),
        }
    }
}

/// Reads payment records from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths, and yields
/// records lazily so large files are streamed.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn records(self) -> impl Iterator<Item = Result<PaymentRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
