use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{PaymentError, PaymentGateway};

#[derive(Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub struct StripeApi {
    secret_key: String,
    url: String,
    client: reqwest::Client,
}

impl StripeApi {
    pub fn new(secret_key: String, url: String) -> Self {
        Self {
            secret_key,
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<String, PaymentError> {
        let mut request = self
            .client
            .post(format!("{}/v1/{}", self.url, path))
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<StripeErrorBody>(&body) {
                Ok(StripeErrorBody { error }) => error
                    .message
                    .or(error.kind)
                    .unwrap_or_else(|| status.to_string()),
                Err(_) => status.to_string(),
            };
            log::warn!("Stripe rejected {}: {}", path, message);
            return Err(PaymentError::Rejected(message));
        }

        let object: StripeObject = serde_json::from_str(&body)
            .with_context(|| format!("Stripe: bad response format for {}", path))
            .map_err(|e| PaymentError::BadResponse(format!("{:#}", e)))?;

        Ok(object.id)
    }
}

#[async_trait]
impl PaymentGateway for StripeApi {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        payment_method: &str,
    ) -> Result<String, PaymentError> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("payment_method", payment_method.to_string()),
            ("confirm", "true".to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("automatic_payment_methods[allow_redirects]", "never".to_string()),
        ];

        self.post("payment_intents", &form, None).await
    }

    async fn create_transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("destination", destination.to_string()),
        ];

        self.post("transfers", &form, Some(idempotency_key)).await
    }

    async fn create_refund(
        &self,
        payment_intent: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        let form = [("payment_intent", payment_intent.to_string())];

        self.post("refunds", &form, Some(idempotency_key)).await
    }

    async fn create_connected_account(&self, email: &str) -> Result<String, PaymentError> {
        let form = [
            ("type", "express".to_string()),
            ("email", email.to_string()),
            ("capabilities[transfers][requested]", "true".to_string()),
        ];

        self.post("accounts", &form, None).await
    }
}
