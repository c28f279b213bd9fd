use super::payment_reader::{PaymentRecord, RecordKind};
use super::result_writer::OutcomeRow;
use crate::application::orchestrator::PaymentOrchestrator;
use crate::domain::transaction::TransactionId;
use crate::error::PaymentError;
use std::collections::HashMap;
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Feeds CSV records through the orchestrator, one request per row.
///
/// Payment rows register their `reference` so later rows can point at the transaction.
/// A reference that was never registered is used as a transaction id as-is.
pub struct BatchRunner<'a> {
    orchestrator: &'a PaymentOrchestrator,
    references: HashMap<String, TransactionId>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(orchestrator: &'a PaymentOrchestrator) -> Self {
        Self {
            orchestrator,
            references: HashMap::new(),
        }
    }

    fn resolve(&self, reference: &str) -> TransactionId {
        self.references
            .get(reference)
            .cloned()
            .unwrap_or_else(|| TransactionId::from(reference))
    }

    pub async fn process(&mut self, record: PaymentRecord) -> OutcomeRow {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!("csv_record", reference = %record.reference, kind = record.kind.as_str());
        self.dispatch(record, &correlation_id).instrument(span).await
    }

    async fn dispatch(&mut self, record: PaymentRecord, correlation_id: &str) -> OutcomeRow {
        let reference = record.reference.as_str();
        match record.kind {
            RecordKind::Payment => {
                let result = match record.to_payment_request() {
                    Ok(request) => self.orchestrator.process_payment(request, correlation_id).await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(response) => {
                        self.references
                            .insert(record.reference.clone(), response.transaction_id.clone());
                        OutcomeRow::payment(reference, "payment", &response)
                    }
                    Err(err) => {
                        let id = match &err {
                            PaymentError::PaymentProcessing {
                                transaction_id: Some(id),
                                ..
                            } => {
                                self.references.insert(record.reference.clone(), id.clone());
                                Some(id.to_string())
                            }
                            _ => None,
                        };
                        OutcomeRow::error(reference, "payment", id, &err)
                    }
                }
            }
            RecordKind::Refund => {
                let transaction_id = self.resolve(reference);
                match self
                    .orchestrator
                    .process_refund(&transaction_id, record.to_refund_request(), correlation_id)
                    .await
                {
                    Ok(response) => OutcomeRow::refund(reference, &response),
                    Err(err) => {
                        let id = match &err {
                            PaymentError::RefundProcessing { refund_id, .. } => {
                                Some(refund_id.to_string())
                            }
                            _ => None,
                        };
                        OutcomeRow::error(reference, "refund", id, &err)
                    }
                }
            }
            RecordKind::Status => {
                let transaction_id = self.resolve(reference);
                match self
                    .orchestrator
                    .get_payment_status(&transaction_id, correlation_id)
                    .await
                {
                    Ok(response) => OutcomeRow::payment(reference, "status", &response),
                    Err(err) => OutcomeRow::error(
                        reference,
                        "status",
                        Some(transaction_id.to_string()),
                        &err,
                    ),
                }
            }
        }
    }
}
