use crate::domain::ports::EventPublisher;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Severity an event is logged at, derived from its type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn for_event_type(event_type: &str) -> Self {
        let event_type = event_type.to_ascii_lowercase();
        if event_type.contains("error") || event_type.contains("failed") {
            EventLevel::Error
        } else if event_type.contains("warning") || event_type.contains("declined") {
            EventLevel::Warn
        } else {
            EventLevel::Info
        }
    }
}

/// Publishes lifecycle events as structured log records.
#[derive(Debug, Clone)]
pub struct LogEventPublisher {
    enabled: bool,
}

impl LogEventPublisher {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for LogEventPublisher {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        payload: serde_json::Value,
        key: Option<&str>,
    ) {
        if !self.enabled {
            return;
        }

        let key = key
            .map(str::to_string)
            .or_else(|| {
                payload
                    .get("transaction_id")
                    .or_else(|| payload.get("refund_id"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let correlation_id = payload
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match EventLevel::for_event_type(event_type) {
            EventLevel::Error => {
                error!(topic, event_type, %key, %correlation_id, event_data = %payload, "payment event")
            }
            EventLevel::Warn => {
                warn!(topic, event_type, %key, %correlation_id, event_data = %payload, "payment event")
            }
            EventLevel::Info => {
                info!(topic, event_type, %key, %correlation_id, event_data = %payload, "payment event")
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.enabled
    }
}
