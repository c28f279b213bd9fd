mod common;

use common::{Harness, card_payment, test_config};
use payment_orchestrator::application::orchestrator::{
    HealthStatus, OrchestratorConfig, PAYMENT_STATUS_CHANGED, PaymentOrchestrator,
    REFUND_STATUS_CHANGED,
};
use payment_orchestrator::application::retry::RetryPolicy;
use payment_orchestrator::domain::money::Amount;
use payment_orchestrator::domain::payment::{PaymentRequest, RefundRequest};
use payment_orchestrator::domain::ports::{CardVault, PaymentStore};
use payment_orchestrator::domain::refund::RefundStatus;
use payment_orchestrator::domain::transaction::{
    Metadata, PaymentMethod, PaymentStatus, TransactionId,
};
use payment_orchestrator::error::{GatewayError, PaymentError};
use payment_orchestrator::infrastructure::simulated::SimulatedBankingGateway;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn refund_of(amount: rust_decimal::Decimal) -> RefundRequest {
    RefundRequest {
        amount: Some(amount),
        reason: Some("customer_request".to_string()),
        ..RefundRequest::default()
    }
}

#[tokio::test]
async fn test_card_payment_is_captured() {
    let h = Harness::new();

    let response = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();

    assert_eq!(response.status, PaymentStatus::Captured);
    assert_eq!(response.amount, Amount::new(dec!(99.99)).unwrap());
    assert_eq!(response.currency.as_str(), "USD");
    assert_eq!(response.card_last_four.as_deref(), Some("1111"));
    assert!(response.authorization_id.is_some());
    assert!(response.capture_id.is_some());

    let stored = h.stored(&response.transaction_id).await;
    assert_eq!(stored.status, response.status);
    assert_eq!(stored.capture_id, response.capture_id);
    assert!(stored.expires_at > stored.created_at);

    // Only the encrypted form of the card is persisted
    let encrypted = stored.encrypted_card.as_ref().unwrap();
    assert!(!encrypted.0.contains("4111111111111111"));
    let card = h.vault.decrypt_card(encrypted).unwrap();
    assert_eq!(card.card_number, "4111111111111111");
}

#[tokio::test]
async fn test_declined_payment_is_failed_without_capture() {
    let h = Harness::new();

    let response = h
        .orchestrator
        .process_payment(card_payment(dec!(25.00), "4000000000000002"), "corr-1")
        .await
        .unwrap();

    assert_eq!(response.status, PaymentStatus::Failed);
    assert!(response.capture_id.is_none());
    assert!(response.authorization_id.is_none());
    assert_eq!(h.gateway.capture_calls(), 0);
    assert_eq!(h.stored(&response.transaction_id).await.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_non_card_payment_skips_card_handling() {
    let h = Harness::new();
    let request = PaymentRequest {
        payment_method: PaymentMethod::BankTransfer,
        card_data: None,
        ..card_payment(dec!(10.00), "4111111111111111")
    };

    let response = h.orchestrator.process_payment(request, "corr-1").await.unwrap();

    assert_eq!(response.status, PaymentStatus::Captured);
    assert!(response.card_last_four.is_none());
    assert!(h.stored(&response.transaction_id).await.encrypted_card.is_none());
}

#[tokio::test]
async fn test_invalid_amount_is_rejected_before_anything_is_written() {
    let h = Harness::new();

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(-10.00), "4111111111111111"), "corr-1")
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::ValidationError(_)));
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.gateway.authorize_calls(), 0);
    assert!(h.events.events().await.is_empty());
}

#[tokio::test]
async fn test_invalid_merchant_is_rejected() {
    let h = Harness::new();
    let request = PaymentRequest {
        merchant_id: "ab".to_string(),
        ..card_payment(dec!(10.00), "4111111111111111")
    };

    let err = h.orchestrator.process_payment(request, "corr-1").await.unwrap_err();

    match err {
        PaymentError::ValidationError(message) => assert_eq!(message, "Invalid merchant ID"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn test_card_method_requires_card_data() {
    let h = Harness::new();
    let request = PaymentRequest {
        card_data: None,
        ..card_payment(dec!(10.00), "4111111111111111")
    };

    let err = h.orchestrator.process_payment(request, "corr-1").await.unwrap_err();
    assert!(matches!(err, PaymentError::ValidationError(_)));
}

#[tokio::test]
async fn test_transient_authorize_faults_are_retried() {
    let h = Harness::new();
    h.gateway.fail_next_authorizations(2);

    let response = h
        .orchestrator
        .process_payment(card_payment(dec!(15.00), "4111111111111111"), "corr-1")
        .await
        .unwrap();

    assert_eq!(response.status, PaymentStatus::Captured);
    assert_eq!(h.gateway.authorize_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_transaction() {
    let h = Harness::new();
    h.gateway.fail_next_authorizations(10);

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(15.00), "4111111111111111"), "corr-1")
        .await
        .unwrap_err();

    let PaymentError::PaymentProcessing {
        transaction_id: Some(id),
        source,
    } = err
    else {
        panic!("expected processing error with a transaction id");
    };
    assert!(matches!(
        *source,
        PaymentError::ExternalService {
            operation: "authorize",
            source: GatewayError::Transport(_)
        }
    ));
    assert_eq!(h.gateway.authorize_calls(), 3);
    assert_eq!(h.stored(&id).await.status, PaymentStatus::Failed);
    assert!(h.audit_types().await.contains(&"payment_failed".to_string()));
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let config = OrchestratorConfig {
        gateway_timeout: Duration::from_millis(20),
        authorize_retry: RetryPolicy::no_retry(),
        ..test_config()
    };
    let h = Harness::with(
        SimulatedBankingGateway::new().with_latency(Duration::from_millis(500)),
        config,
    );

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(15.00), "4111111111111111"), "corr-1")
        .await
        .unwrap_err();

    let PaymentError::PaymentProcessing {
        transaction_id: Some(id),
        source,
    } = err
    else {
        panic!("expected processing error with a transaction id");
    };
    assert!(matches!(
        *source,
        PaymentError::ExternalService {
            source: GatewayError::Timeout(_),
            ..
        }
    ));
    assert_eq!(h.stored(&id).await.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_capture_failure_compensates_authorized_transaction() {
    let h = Harness::new();
    h.gateway.fail_captures(true);

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(40.00), "4111111111111111"), "corr-9")
        .await
        .unwrap_err();

    let PaymentError::PaymentProcessing {
        transaction_id: Some(id),
        ..
    } = err
    else {
        panic!("expected processing error with a transaction id");
    };
    let stored = h.stored(&id).await;
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert!(stored.authorization_id.is_some());
    assert!(stored.capture_id.is_none());

    let audit = h.store.inner.audit_log().await;
    let entry = audit.iter().find(|e| e.event_type == "payment_failed").unwrap();
    assert_eq!(entry.transaction_id.as_ref(), Some(&id));
    assert_eq!(entry.correlation_id, "corr-9");
}

#[tokio::test]
async fn test_failed_compensation_does_not_mask_original_error() {
    let h = Harness::new();
    h.gateway.fail_captures(true);
    h.store.fail_batches.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(40.00), "4111111111111111"), "corr-1")
        .await
        .unwrap_err();

    let PaymentError::PaymentProcessing {
        transaction_id: Some(id),
        source,
    } = err
    else {
        panic!("expected processing error with a transaction id");
    };
    assert!(matches!(
        *source,
        PaymentError::ExternalService {
            operation: "capture",
            ..
        }
    ));
    assert_eq!(h.stored(&id).await.status, PaymentStatus::Authorized);
}

#[tokio::test]
async fn test_terminal_transaction_is_not_rewritten_by_compensation() {
    let h = Harness::new();
    h.store.fail_audit.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .process_payment(card_payment(dec!(40.00), "4111111111111111"), "corr-1")
        .await
        .unwrap_err();

    let PaymentError::PaymentProcessing {
        transaction_id: Some(id),
        source,
    } = err
    else {
        panic!("expected processing error with a transaction id");
    };
    assert!(matches!(*source, PaymentError::DatabaseError(_)));
    assert_eq!(h.stored(&id).await.status, PaymentStatus::Captured);
}

#[tokio::test]
async fn test_status_lookup_is_cached() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();
    let reads_before = h.store.transaction_reads();

    let first = h
        .orchestrator
        .get_payment_status(&payment.transaction_id, "corr-2")
        .await
        .unwrap();
    let second = h
        .orchestrator
        .get_payment_status(&payment.transaction_id, "corr-3")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status, PaymentStatus::Captured);
    assert_eq!(h.store.transaction_reads(), reads_before + 1);
}

#[tokio::test]
async fn test_unknown_transaction_status_is_not_found() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .get_payment_status(&TransactionId::from("txn_missing"), "corr-1")
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::TransactionNotFound(_)));
    assert_eq!(err.kind().status_code(), 404);
}

#[tokio::test]
async fn test_partial_refund_completes_and_leaves_transaction_unchanged() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();

    let refund = h
        .orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(50.00)), "corr-2")
        .await
        .unwrap();

    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.amount, Amount::new(dec!(50.00)).unwrap());
    assert_eq!(refund.transaction_id, payment.transaction_id);
    assert!(refund.external_refund_id.is_some());
    assert!(refund.processed_at.is_some());

    let stored = h.stored(&payment.transaction_id).await;
    assert_eq!(stored.status, PaymentStatus::Captured);
    assert_eq!(stored.amount, Amount::new(dec!(99.99)).unwrap());

    let persisted = h.store.inner.get_refund(&refund.refund_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, RefundStatus::Completed);
}

#[tokio::test]
async fn test_refunds_never_exceed_the_captured_amount() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();
    let id = &payment.transaction_id;

    h.orchestrator
        .process_refund(id, refund_of(dec!(50.00)), "corr-2")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .process_refund(id, refund_of(dec!(60.00)), "corr-3")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ValidationError(_)));

    // No amount means the full captured amount, which no longer fits
    let err = h
        .orchestrator
        .process_refund(id, RefundRequest::default(), "corr-4")
        .await
        .unwrap_err();
    match err {
        PaymentError::ValidationError(message) => assert_eq!(
            message,
            "Refund amount exceeds remaining refundable balance of 49.99"
        ),
        other => panic!("expected validation error, got {:?}", other),
    }

    let rest = h
        .orchestrator
        .process_refund(id, refund_of(dec!(49.99)), "corr-5")
        .await
        .unwrap();
    assert_eq!(rest.status, RefundStatus::Completed);
    assert_eq!(h.gateway.refund_calls(), 2);
}

#[tokio::test]
async fn test_refund_without_amount_refunds_the_full_payment() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();

    let refund = h
        .orchestrator
        .process_refund(&payment.transaction_id, RefundRequest::default(), "corr-2")
        .await
        .unwrap();
    assert_eq!(refund.amount, Amount::new(dec!(99.99)).unwrap());
    assert_eq!(refund.status, RefundStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_refunds_cannot_overdraw_the_payment() {
    let h = Harness::with(
        SimulatedBankingGateway::new().with_latency(Duration::from_millis(50)),
        test_config(),
    );
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();
    let id = &payment.transaction_id;

    let (first, second) = tokio::join!(
        h.orchestrator.process_refund(id, refund_of(dec!(60.00)), "corr-2"),
        h.orchestrator.process_refund(id, refund_of(dec!(60.00)), "corr-3"),
    );

    let (completed, rejected): (Vec<_>, Vec<_>) =
        [first, second].into_iter().partition(Result::is_ok);
    assert_eq!(completed.len(), 1);
    assert!(matches!(rejected[0], Err(PaymentError::ValidationError(_))));
    assert_eq!(h.gateway.refund_calls(), 1);

    let refunds = h.store.inner.list_refunds(id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].status, RefundStatus::Completed);
    assert_eq!(refunds[0].amount, Amount::new(dec!(60.00)).unwrap());
}

#[tokio::test]
async fn test_refund_above_original_amount_is_rejected_before_gateway() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-1")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(150.00)), "corr-2")
        .await
        .unwrap_err();

    match err {
        PaymentError::ValidationError(message) => {
            assert_eq!(message, "Refund amount cannot exceed original transaction amount")
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(h.gateway.refund_calls(), 0);
    assert!(h.store.inner.list_refunds(&payment.transaction_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refund_requires_captured_transaction() {
    let h = Harness::new();
    let declined = h
        .orchestrator
        .process_payment(card_payment(dec!(20.00), "4000000000000002"), "corr-1")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .process_refund(&declined.transaction_id, refund_of(dec!(5.00)), "corr-2")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PaymentError::InvalidTransactionState {
            current: PaymentStatus::Failed,
            ..
        }
    ));
    assert_eq!(h.gateway.refund_calls(), 0);
    assert!(h.store.inner.list_refunds(&declined.transaction_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refund_of_unknown_transaction_is_not_found() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .process_refund(&TransactionId::from("txn_missing"), refund_of(dec!(5.00)), "corr-1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::TransactionNotFound(_)));
}

#[tokio::test]
async fn test_unconfirmed_refund_is_recorded_as_failed() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(30.00), "4111111111111111"), "corr-1")
        .await
        .unwrap();
    h.gateway.reject_refunds(true);

    let refund = h
        .orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(30.00)), "corr-2")
        .await
        .unwrap();

    assert_eq!(refund.status, RefundStatus::Failed);
    assert!(refund.processed_at.is_none());

    // A failed refund does not consume the refundable balance
    h.gateway.reject_refunds(false);
    let retry = h
        .orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(30.00)), "corr-3")
        .await
        .unwrap();
    assert_eq!(retry.status, RefundStatus::Completed);
}

#[tokio::test]
async fn test_refund_store_failure_compensates_pending_refund() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(30.00), "4111111111111111"), "corr-1")
        .await
        .unwrap();
    h.store.fail_refund_updates.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(10.00)), "corr-2")
        .await
        .unwrap_err();

    let PaymentError::RefundProcessing {
        refund_id,
        transaction_id,
        source,
    } = err
    else {
        panic!("expected refund processing error");
    };
    assert_eq!(transaction_id, payment.transaction_id);
    assert!(matches!(*source, PaymentError::DatabaseError(_)));

    let refund = h.store.inner.get_refund(&refund_id).await.unwrap().unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);
    assert!(h.audit_types().await.contains(&"refund_failed".to_string()));
}

#[tokio::test]
async fn test_events_and_audit_trail_are_written() {
    let h = Harness::new();
    let payment = h
        .orchestrator
        .process_payment(card_payment(dec!(99.99), "4111111111111111"), "corr-7")
        .await
        .unwrap();
    h.orchestrator
        .process_refund(&payment.transaction_id, refund_of(dec!(10.00)), "corr-8")
        .await
        .unwrap();

    let events = h.events.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, PAYMENT_STATUS_CHANGED);
    assert_eq!(events[0].topic, "payment-events");
    assert_eq!(events[0].key.as_deref(), Some(payment.transaction_id.as_str()));
    assert_eq!(events[0].payload["status"], "captured");
    assert_eq!(events[0].payload["correlation_id"], "corr-7");
    assert_eq!(events[1].event_type, REFUND_STATUS_CHANGED);
    assert_eq!(events[1].payload["status"], "completed");

    let audit = h.store.inner.audit_log().await;
    let types: Vec<&str> = audit.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["payment_created", "refund_created"]);
    assert_eq!(audit[0].event_data["merchant_id"], "merchant_123");
    assert_eq!(audit[0].event_data["amount"], "99.99");
    assert_eq!(audit[1].correlation_id, "corr-8");
}

#[tokio::test]
async fn test_health_reflects_collaborators() {
    let h = Harness::new();

    let report = h.orchestrator.health_check().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.services.database);
    assert!(report.services.banking_service);
    assert!(report.services.event_service);

    h.gateway.set_healthy(false);
    let report = h.orchestrator.health_check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(!report.services.banking_service);
    assert!(report.services.database);
}

#[tokio::test]
async fn test_concurrent_payments_get_distinct_transactions() {
    let h = Harness::new();
    let orchestrator: Arc<PaymentOrchestrator> = Arc::new(h.orchestrator);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let request = PaymentRequest {
                    metadata: Metadata::from([("order".to_string(), serde_json::json!(i))]),
                    ..card_payment(dec!(5.00), "4111111111111111")
                };
                orchestrator
                    .process_payment(request, &format!("corr-{}", i))
                    .await
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, PaymentStatus::Captured);
        ids.insert(response.transaction_id);
    }
    assert_eq!(ids.len(), 20);
    assert_eq!(h.gateway.authorize_calls(), 20);
}
