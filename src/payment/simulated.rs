//! In-process gateway used for local runs and tests.
//!
//! Behaves like a well-mannered remote gateway: charges are deduplicated by
//! idempotency key, listed newest first, and refundable. Failures and
//! latency can be injected to exercise the breaker and retry paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::gateway::{Charge, ChargeRequest, GatewayClient, Refund};
use crate::error::{CoreError, GatewayFailure};

#[derive(Debug, Default)]
struct Ledger {
    charges: Vec<Charge>,
    by_key: HashMap<String, usize>,
    refunded: HashMap<String, i64>,
    injected: VecDeque<GatewayFailure>,
    latency: Duration,
}

/// Simulated payment gateway.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    ledger: Mutex<Ledger>,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
    next_id: AtomicU64,
}

impl SimulatedGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` create/refund calls fail with `failure`.
    pub async fn fail_next(&self, count: usize, failure: GatewayFailure) {
        let mut ledger = self.ledger.lock().await;
        for _ in 0..count {
            ledger.injected.push_back(failure.clone());
        }
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.ledger.lock().await.latency = latency;
    }

    /// Number of `create_charge` calls received, including failed ones.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_charges` calls received.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct charges created.
    pub async fn charge_count(&self) -> usize {
        self.ledger.lock().await.charges.len()
    }

    async fn delay(&self) {
        let latency = self.ledger.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        format!("{prefix}_sim_{n:06}")
    }
}

#[async_trait]
impl GatewayClient for SimulatedGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, CoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut ledger = self.ledger.lock().await;
        if let Some(failure) = ledger.injected.pop_front() {
            return Err(CoreError::Gateway(failure));
        }

        let key = request.idempotency_key.as_str().to_string();
        if let Some(existing) = ledger.by_key.get(&key).and_then(|&i| ledger.charges.get(i)) {
            return Ok(existing.clone());
        }

        let charge = Charge {
            id: self.next_id("ch"),
            status: "succeeded".to_string(),
            amount: request.amount,
            currency: request.currency.clone(),
            customer_id: request.customer_id.clone(),
            created: Utc::now().timestamp(),
            metadata: request.metadata.clone(),
        };
        let index = ledger.charges.len();
        ledger.charges.push(charge.clone());
        ledger.by_key.insert(key, index);
        Ok(charge)
    }

    async fn list_charges(&self, customer_id: &str, limit: u32) -> Result<Vec<Charge>, CoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .charges
            .iter()
            .rev()
            .filter(|c| c.customer_id == customer_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn refund(&self, charge_id: &str, amount: Option<i64>) -> Result<Refund, CoreError> {
        self.delay().await;
        let mut ledger = self.ledger.lock().await;
        if let Some(failure) = ledger.injected.pop_front() {
            return Err(CoreError::Gateway(failure));
        }

        let Some(charged) = ledger.charges.iter().find(|c| c.id == charge_id).map(|c| c.amount)
        else {
            return Err(CoreError::Gateway(GatewayFailure::new(
                "resource_missing",
                format!("No such charge: '{charge_id}'"),
            )));
        };
        let already = ledger.refunded.get(charge_id).copied().unwrap_or(0);
        let amount = amount.unwrap_or(charged - already);
        if amount <= 0 || already.saturating_add(amount) > charged {
            return Err(CoreError::Gateway(GatewayFailure::new(
                "charge_already_refunded",
                format!("Refund of {amount} exceeds remaining balance on {charge_id}"),
            )));
        }
        ledger
            .refunded
            .insert(charge_id.to_string(), already.saturating_add(amount));

        Ok(Refund {
            id: self.next_id("re"),
            charge_id: charge_id.to_string(),
            status: "succeeded".to_string(),
            amount,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::IdempotencyKey;

    fn request(key: &str) -> ChargeRequest {
        ChargeRequest {
            amount: 1500,
            currency: "usd".to_string(),
            customer_id: "cus_1".to_string(),
            metadata: BTreeMap::new(),
            idempotency_key: IdempotencyKey::from_raw(key),
        }
    }

    #[tokio::test]
    async fn same_key_returns_same_charge() {
        let gateway = SimulatedGateway::new();
        let Ok(a) = gateway.create_charge(&request("K_1")).await else {
            panic!("charge failed");
        };
        let Ok(b) = gateway.create_charge(&request("K_1")).await else {
            panic!("charge failed");
        };
        assert_eq!(a.id, b.id);
        assert_eq!(gateway.create_calls(), 2);
        assert_eq!(gateway.charge_count().await, 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let gateway = SimulatedGateway::new();
        gateway
            .fail_next(1, GatewayFailure::new("card_declined", "Your card was declined."))
            .await;

        let Err(err) = gateway.create_charge(&request("K_1")).await else {
            panic!("expected injected failure");
        };
        assert_eq!(err.error_code(), "card_declined");
        assert!(gateway.create_charge(&request("K_1")).await.is_ok());
    }

    #[tokio::test]
    async fn refunds_are_bounded_by_charge() {
        let gateway = SimulatedGateway::new();
        let Ok(charge) = gateway.create_charge(&request("K_1")).await else {
            panic!("charge failed");
        };

        let Ok(partial) = gateway.refund(&charge.id, Some(500)).await else {
            panic!("partial refund failed");
        };
        assert_eq!(partial.amount, 500);

        let Ok(rest) = gateway.refund(&charge.id, None).await else {
            panic!("remaining refund failed");
        };
        assert_eq!(rest.amount, 1000);

        assert!(gateway.refund(&charge.id, Some(1)).await.is_err());
        assert!(gateway.refund("ch_missing", None).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_customer() {
        let gateway = SimulatedGateway::new();
        let _ = gateway.create_charge(&request("K_1")).await;
        let mut other = request("K_2");
        other.customer_id = "cus_2".to_string();
        let _ = gateway.create_charge(&other).await;

        let Ok(charges) = gateway.list_charges("cus_1", 10).await else {
            panic!("list failed");
        };
        assert_eq!(charges.len(), 1);
    }
}
