//! HTTP client for the external banking API.

use crate::domain::card::CardData;
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::{AuthorizationOutcome, BankingGateway, CaptureReceipt, RefundOutcome};
use crate::domain::transaction::TransactionId;
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const CORRELATION_HEADER: &str = "X-Correlation-ID";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    transaction_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cvv: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cardholder_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    authorization_id: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeclineResponse {
    message: Option<String>,
    decline_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    authorization_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    capture_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    transaction_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    refund_id: Option<String>,
    status: Option<String>,
}

/// Banking gateway speaking JSON over HTTP.
///
/// `200` from `/api/v1/authorize` is an approval and `402` a decline. Any other status
/// is a [`GatewayError`].
#[derive(Clone)]
pub struct HttpBankingGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBankingGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        correlation_id: &str,
    ) -> Result<(StatusCode, String), GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .header(CORRELATION_HEADER, correlation_id)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(%status, path, "banking API response");
        Ok((status, body))
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

fn unexpected(status: StatusCode, body: String) -> GatewayError {
    GatewayError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl BankingGateway for HttpBankingGateway {
    async fn authorize(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        currency: &Currency,
        card: Option<&CardData>,
        correlation_id: &str,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        info!(%transaction_id, %amount, %currency, correlation_id, "authorizing payment");
        let request = AuthorizeRequest {
            transaction_id: transaction_id.as_str(),
            amount: amount.value(),
            currency: currency.as_str(),
            card_number: card.map(|c| c.card_number.as_str()),
            expiry_month: card.map(|c| c.expiry_month),
            expiry_year: card.map(|c| c.expiry_year),
            cvv: card.map(|c| c.cvv.as_str()),
            cardholder_name: card.map(|c| c.cardholder_name.as_str()),
        };

        let (status, body) = self.post("/api/v1/authorize", &request, correlation_id).await?;
        match status {
            StatusCode::OK => {
                let response: AuthorizeResponse = parse(&body)?;
                let authorization_id = response.authorization_id.ok_or_else(|| {
                    GatewayError::InvalidResponse("missing authorization_id".to_string())
                })?;
                info!(%transaction_id, %authorization_id, "payment authorized by bank");
                Ok(AuthorizationOutcome::Approved {
                    authorization_id,
                    message: response.message,
                })
            }
            StatusCode::PAYMENT_REQUIRED => {
                let response: DeclineResponse = parse(&body).unwrap_or(DeclineResponse {
                    message: None,
                    decline_code: None,
                });
                let message = response
                    .message
                    .unwrap_or_else(|| "Payment declined".to_string());
                warn!(%transaction_id, decline_reason = %message, "payment declined by bank");
                Ok(AuthorizationOutcome::Declined {
                    message,
                    decline_code: response.decline_code,
                })
            }
            other => {
                error!(%transaction_id, status = %other, "unexpected authorize response");
                Err(unexpected(other, body))
            }
        }
    }

    async fn capture(
        &self,
        authorization_id: &str,
        correlation_id: &str,
    ) -> Result<CaptureReceipt, GatewayError> {
        info!(authorization_id, correlation_id, "capturing payment");
        let request = CaptureRequest { authorization_id };
        let (status, body) = self.post("/api/v1/capture", &request, correlation_id).await?;
        if !status.is_success() {
            return Err(unexpected(status, body));
        }
        let response: CaptureResponse = parse(&body)?;
        let capture_id = response
            .capture_id
            .ok_or_else(|| GatewayError::InvalidResponse("missing capture_id".to_string()))?;
        Ok(CaptureReceipt { capture_id })
    }

    async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        correlation_id: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        info!(%transaction_id, %amount, correlation_id, "processing refund");
        let request = RefundRequest {
            transaction_id: transaction_id.as_str(),
            amount: amount.value(),
        };
        let (status, body) = self.post("/api/v1/refund", &request, correlation_id).await?;
        if !status.is_success() {
            return Err(unexpected(status, body));
        }
        let response: RefundResponse = parse(&body)?;
        Ok(RefundOutcome {
            refunded: response.status.as_deref() == Some("refunded"),
            external_refund_id: response.refund_id,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                warn!(error = %err, "banking service health check failed");
                false
            }
        }
    }
}
