use async_trait::async_trait;

#[cfg(any(test, feature = "test-support"))]
pub mod recording;
pub mod stripe;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("{0}")]
    Rejected(String),
    #[error("Payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Bad response from payment processor: {0}")]
    BadResponse(String),
}

/// Remote payment processor. Amounts are in currency minor units.
///
/// `idempotency_key`, when given, makes a retried call return the original
/// result instead of moving money twice.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        payment_method: &str,
    ) -> Result<String, PaymentError>;

    async fn create_transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError>;

    async fn create_refund(
        &self,
        payment_intent: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError>;

    async fn create_connected_account(&self, email: &str) -> Result<String, PaymentError>;
}
