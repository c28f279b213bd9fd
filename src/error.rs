use crate::domain::refund::RefundId;
use crate::domain::transaction::{PaymentStatus, TransactionId};
use std::time::Duration;
use thiserror::Error;

/// Faults raised by a banking gateway call.
///
/// A decline is not a fault: it is reported as a regular
/// [`AuthorizationOutcome::Declined`](crate::domain::ports::AuthorizationOutcome) value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("gateway response could not be understood: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the fault is transient and the call may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) | GatewayError::Transport(_) => true,
            GatewayError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            GatewayError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("Transaction {transaction_id} is in state '{current}' but requires '{required}'")]
    InvalidTransactionState {
        transaction_id: TransactionId,
        current: PaymentStatus,
        required: PaymentStatus,
    },
    #[error("{entity} {id} cannot move from '{from}' to '{to}'")]
    IllegalTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },
    #[error("Payment processing failed")]
    PaymentProcessing {
        transaction_id: Option<TransactionId>,
        #[source]
        source: Box<PaymentError>,
    },
    #[error("Refund processing failed")]
    RefundProcessing {
        refund_id: RefundId,
        transaction_id: TransactionId,
        #[source]
        source: Box<PaymentError>,
    },
    #[error("Banking service {operation} failed: {source}")]
    ExternalService {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },
    #[error("Encryption error: {0}")]
    EncryptionError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::DatabaseError(err.to_string())
    }
}

/// Coarse classification used by adapters to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::ValidationError(_) | PaymentError::InvalidTransactionState { .. } => {
                ErrorKind::Validation
            }
            PaymentError::TransactionNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }

    /// Message that is safe to show to the caller. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => self.to_string(),
            ErrorKind::NotFound => match self {
                PaymentError::TransactionNotFound(id) => format!("Payment {} not found", id),
                _ => "Not found".to_string(),
            },
            ErrorKind::Internal => match self {
                PaymentError::RefundProcessing { .. } => "Refund processing failed".to_string(),
                _ => "Payment processing failed".to_string(),
            },
        }
    }

    /// Short label for metric tags.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentError::ValidationError(_) => "validation",
            PaymentError::TransactionNotFound(_) => "not_found",
            PaymentError::InvalidTransactionState { .. } => "invalid_state",
            PaymentError::IllegalTransition { .. } => "illegal_transition",
            PaymentError::PaymentProcessing { .. } => "payment_processing",
            PaymentError::RefundProcessing { .. } => "refund_processing",
            PaymentError::ExternalService { .. } => "external_service",
            PaymentError::EncryptionError(_) => "encryption",
            PaymentError::DatabaseError(_) => "database",
            PaymentError::CacheError(_) => "cache",
            PaymentError::CsvError(_) => "csv",
            PaymentError::IoError(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
