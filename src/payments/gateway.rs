use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct IntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: Vec<(String, String)>,
    pub receipt_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Processor-side state of an intent, reduced to what settlement cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Processing,
    Succeeded,
    Canceled,
}

/// External card processor. Confirmation happens between the client and the
/// processor; this side only opens intents and reads their outcome.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> AppResult<PaymentIntent>;

    async fn intent_status(&self, intent_id: &str) -> AppResult<IntentStatus>;
}

pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    async fn decode(response: reqwest::Response) -> AppResult<StripeIntent> {
        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("processor returned {status}"));
            return Err(AppError::Gateway(message));
        }
        response
            .json::<StripeIntent>()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: IntentRequest) -> AppResult<PaymentIntent> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), request.amount_minor.to_string()),
            ("currency".into(), request.currency.clone()),
            ("payment_method_types[]".into(), "card".into()),
        ];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".into(), email.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let intent = Self::decode(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::Gateway("intent has no client secret".into()))?;

        tracing::info!(intent_id = %intent.id, amount = request.amount_minor, "payment intent created");
        Ok(PaymentIntent {
            id: intent.id,
            client_secret,
        })
    }

    async fn intent_status(&self, intent_id: &str) -> AppResult<IntentStatus> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let intent = Self::decode(response).await?;
        Ok(match intent.status.as_str() {
            "succeeded" => IntentStatus::Succeeded,
            "canceled" => IntentStatus::Canceled,
            _ => IntentStatus::Processing,
        })
    }
}

/// In-memory processor used in development and tests. Records every request
/// and lets callers settle intents by hand.
#[derive(Default)]
pub struct MockGateway {
    requests: Mutex<Vec<IntentRequest>>,
    statuses: Mutex<HashMap<String, IntentStatus>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<IntentRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn settle(&self, intent_id: &str, status: IntentStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(intent_id.to_string(), status);
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, request: IntentRequest) -> AppResult<PaymentIntent> {
        if request.amount_minor <= 0 {
            return Err(AppError::Gateway("Amount must be greater than zero".into()));
        }
        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let client_secret = format!("{id}_secret_{}", Uuid::new_v4().simple());

        self.requests
            .lock()
            .map_err(|_| AppError::Gateway("mock gateway poisoned".into()))?
            .push(request);
        self.statuses
            .lock()
            .map_err(|_| AppError::Gateway("mock gateway poisoned".into()))?
            .insert(id.clone(), IntentStatus::Processing);

        tracing::debug!(intent_id = %id, "mock payment intent created");
        Ok(PaymentIntent { id, client_secret })
    }

    async fn intent_status(&self, intent_id: &str) -> AppResult<IntentStatus> {
        let statuses = self
            .statuses
            .lock()
            .map_err(|_| AppError::Gateway("mock gateway poisoned".into()))?;
        statuses
            .get(intent_id)
            .copied()
            .ok_or_else(|| AppError::Gateway(format!("unknown intent {intent_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount_minor: i64) -> IntentRequest {
        IntentRequest {
            amount_minor,
            currency: "brl".into(),
            metadata: vec![("user_id".into(), "u1".into())],
            receipt_email: None,
        }
    }

    #[tokio::test]
    async fn mock_records_requests_and_starts_processing() {
        let gateway = MockGateway::new();
        let intent = gateway.create_intent(request(4990)).await.unwrap();

        assert!(intent.client_secret.starts_with(&intent.id));
        assert_eq!(gateway.requests()[0].amount_minor, 4990);
        assert_eq!(
            gateway.intent_status(&intent.id).await.unwrap(),
            IntentStatus::Processing
        );

        gateway.settle(&intent.id, IntentStatus::Succeeded);
        assert_eq!(
            gateway.intent_status(&intent.id).await.unwrap(),
            IntentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn mock_rejects_zero_amount() {
        let gateway = MockGateway::new();
        assert!(matches!(
            gateway.create_intent(request(0)).await,
            Err(AppError::Gateway(_))
        ));
        assert!(gateway.requests().is_empty());
    }
}
