use crate::domain::payment::{PaymentResponse, RefundResponse};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::io::Write;

/// One output row: the outcome of a single input record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRow {
    pub reference: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Option<String>,
    pub status: String,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub card_last_four: Option<String>,
    pub detail: Option<String>,
}

impl OutcomeRow {
    pub fn payment(reference: &str, kind: &'static str, response: &PaymentResponse) -> Self {
        Self {
            reference: reference.to_string(),
            kind,
            id: Some(response.transaction_id.to_string()),
            status: response.status.to_string(),
            amount: Some(response.amount.to_string()),
            currency: Some(response.currency.to_string()),
            card_last_four: response.card_last_four.clone(),
            detail: response.capture_id.clone().or_else(|| response.authorization_id.clone()),
        }
    }

    pub fn refund(reference: &str, response: &RefundResponse) -> Self {
        Self {
            reference: reference.to_string(),
            kind: "refund",
            id: Some(response.refund_id.to_string()),
            status: response.status.to_string(),
            amount: Some(response.amount.to_string()),
            currency: Some(response.currency.to_string()),
            card_last_four: None,
            detail: response.external_refund_id.clone(),
        }
    }

    /// Error row carrying only what a caller may see: the status code, the error kind and
    /// the public message.
    pub fn error(
        reference: &str,
        kind: &'static str,
        id: Option<String>,
        err: &PaymentError,
    ) -> Self {
        let error_kind = err.kind();
        Self {
            reference: reference.to_string(),
            kind,
            id,
            status: "error".to_string(),
            amount: None,
            currency: None,
            card_last_four: None,
            detail: Some(format!(
                "{} {}: {}",
                error_kind.status_code(),
                error_kind.as_str(),
                err.public_message()
            )),
        }
    }
}

/// Writes outcome rows as CSV with a header line.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_row(&mut self, row: &OutcomeRow) -> Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(PaymentError::from)
    }
}
