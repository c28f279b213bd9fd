use super::transaction::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only observability record. Written by the orchestrator, never read back by it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub transaction_id: Option<TransactionId>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        transaction_id: Option<TransactionId>,
        event_type: impl Into<String>,
        event_data: serde_json::Value,
        correlation_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            event_type: event_type.into(),
            event_data,
            correlation_id: correlation_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
