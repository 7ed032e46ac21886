use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::ports::{ChargeRequest, PaymentGateway, PaymentSession};

/// Payment collaborator over its HTTP charge-initialization endpoint.
///
/// Only the two contract points exist here: open a charge session for an
/// exact amount, and expose the provider's minimum chargeable amount. The
/// asynchronous success/failure notification arrives separately on the
/// webhook route.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    min_charge_minor: i64,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret_key: String, min_charge_minor: i64) -> Self {
        HttpPaymentGateway {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            min_charge_minor,
        }
    }
}

/// Session references are derived from the order id, so re-initializing a
/// charge for the same order reuses the same reference at the provider.
pub(crate) fn session_reference(order_id: Uuid) -> String {
    format!("gw-{}", order_id.simple())
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    data: InitializeData,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn minimum_charge_minor(&self) -> i64 {
        self.min_charge_minor
    }

    async fn create_session(
        &self,
        request: &ChargeRequest,
    ) -> Result<PaymentSession, DomainError> {
        let reference = session_reference(request.order_id);
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "amount": request.amount_minor,
                "currency": request.currency,
                "email": request.email,
                "reference": reference,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    DomainError::TransientStore(e.to_string())
                } else {
                    DomainError::PaymentRejected(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DomainError::PaymentRejected(format!(
                "charge initialization returned {}",
                response.status()
            )));
        }
        let body: InitializeResponse = response
            .json()
            .await
            .map_err(|e| DomainError::PaymentRejected(format!("malformed gateway response: {e}")))?;
        Ok(PaymentSession {
            reference,
            authorization_url: body.data.authorization_url,
        })
    }
}
