//! A [`PaymentGateway`] that records every call and answers with fake ids.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PaymentError, PaymentGateway};

#[derive(Clone, Debug, PartialEq)]
pub enum PaymentCall {
    PaymentIntent {
        amount: i64,
        currency: String,
        payment_method: String,
    },
    Transfer {
        amount: i64,
        destination: String,
        idempotency_key: String,
    },
    Refund {
        payment_intent: String,
        idempotency_key: String,
    },
    ConnectedAccount {
        email: String,
    },
}

#[derive(Clone, Default)]
pub struct RecordingGateway {
    calls: Arc<Mutex<Vec<PaymentCall>>>,
    declining: Arc<AtomicBool>,
    settlement_delay_ms: Arc<AtomicU64>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `PaymentError::Rejected`.
    pub fn decline_all(&self) {
        self.declining.store(true, Ordering::SeqCst);
    }

    pub fn accept_all(&self) {
        self.declining.store(false, Ordering::SeqCst);
    }

    /// Transfers and refunds wait this long before answering, which keeps
    /// them in flight while other requests run.
    pub fn delay_settlements(&self, delay: Duration) {
        self.settlement_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Transfers and refunds recorded so far.
    pub async fn money_movements(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    PaymentCall::Transfer { .. } | PaymentCall::Refund { .. }
                )
            })
            .count()
    }

    async fn settlement_delay(&self) {
        let millis = self.settlement_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    pub async fn calls(&self) -> Vec<PaymentCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: PaymentCall, prefix: &str) -> Result<String, PaymentError> {
        if self.declining.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected("Your card was declined.".to_string()));
        }

        let mut calls = self.calls.lock().await;
        calls.push(call);

        Ok(format!("{}_{}", prefix, calls.len()))
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        payment_method: &str,
    ) -> Result<String, PaymentError> {
        self.record(
            PaymentCall::PaymentIntent {
                amount,
                currency: currency.to_string(),
                payment_method: payment_method.to_string(),
            },
            "pi",
        )
        .await
    }

    async fn create_transfer(
        &self,
        amount: i64,
        _currency: &str,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        self.settlement_delay().await;
        self.record(
            PaymentCall::Transfer {
                amount,
                destination: destination.to_string(),
                idempotency_key: idempotency_key.to_string(),
            },
            "tr",
        )
        .await
    }

    async fn create_refund(
        &self,
        payment_intent: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        self.settlement_delay().await;
        self.record(
            PaymentCall::Refund {
                payment_intent: payment_intent.to_string(),
                idempotency_key: idempotency_key.to_string(),
            },
            "re",
        )
        .await
    }

    async fn create_connected_account(&self, email: &str) -> Result<String, PaymentError> {
        self.record(
            PaymentCall::ConnectedAccount {
                email: email.to_string(),
            },
            "acct",
        )
        .await
    }
}
