//! REST gateway client.
//!
//! Talks JSON to a charges/refunds style REST API. The idempotency key is
//! sent in the `Idempotency-Key` header and the gateway's error envelope is
//! mapped to [`CoreError::Gateway`] with its code and message intact.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::gateway::{Charge, ChargeRequest, GatewayClient, Refund};
use crate::error::{CoreError, GatewayFailure};

/// Header used to pass the idempotency key to the gateway.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Vec<Charge>,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    charge: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
}

/// JSON-over-HTTP gateway client.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGatewayClient {
    /// Builds a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("gateway client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CoreError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                CoreError::Gateway(GatewayFailure::new(
                    "invalid_response",
                    format!("unreadable gateway response: {e}"),
                ))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let mut failure = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => GatewayFailure::new(
                envelope
                    .error
                    .code
                    .or(envelope.error.kind)
                    .unwrap_or_else(|| "api_error".to_string()),
                envelope
                    .error
                    .message
                    .unwrap_or_else(|| format!("gateway returned {status}")),
            ),
            Err(_) => GatewayFailure::new(
                if status.as_u16() == 429 {
                    "rate_limited"
                } else {
                    "api_error"
                },
                format!("gateway returned {status}"),
            ),
        };
        failure.status = Some(status.as_u16());
        Err(CoreError::Gateway(failure))
    }
}

fn transport_error(err: &reqwest::Error) -> CoreError {
    if err.is_timeout() {
        return CoreError::Gateway(GatewayFailure::new("gateway_timeout", err.to_string()));
    }
    CoreError::Gateway(GatewayFailure::new("api_connection_error", err.to_string()))
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, CoreError> {
        let response = self
            .http
            .post(self.url("/v1/charges"))
            .bearer_auth(&self.api_key)
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        Self::decode(response).await
    }

    async fn list_charges(&self, customer_id: &str, limit: u32) -> Result<Vec<Charge>, CoreError> {
        let limit = limit.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.url("/v1/charges"),
            &[("customer", customer_id), ("limit", limit.as_str())],
        )
        .map_err(|e| CoreError::Internal(format!("gateway url: {e}")))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let list: ChargeList = Self::decode(response).await?;
        Ok(list.data)
    }

    async fn refund(&self, charge_id: &str, amount: Option<i64>) -> Result<Refund, CoreError> {
        let response = self
            .http
            .post(self.url("/v1/refunds"))
            .bearer_auth(&self.api_key)
            .json(&RefundBody {
                charge: charge_id,
                amount,
            })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let mut refund: Refund = Self::decode(response).await?;
        if refund.charge_id.is_empty() {
            refund.charge_id = charge_id.to_string();
        }
        Ok(refund)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use super::*;
    use crate::domain::IdempotencyKey;

    #[derive(Debug, Default)]
    struct Seen {
        idempotency_key: Option<String>,
        authorization: Option<String>,
        charge_body: Option<Value>,
        list_query: Option<HashMap<String, String>>,
    }

    type Shared = Arc<Mutex<Seen>>;

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    async fn create(State(seen): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let mut seen = seen.lock().await;
        seen.idempotency_key = header(&headers, IDEMPOTENCY_HEADER);
        seen.authorization = header(&headers, "authorization");
        let charge = json!({
            "id": "ch_remote_1",
            "status": "succeeded",
            "amount": body["amount"],
            "currency": body["currency"],
            "customer_id": body["customer_id"],
            "created": 1_700_000_000,
            "metadata": body["metadata"],
        });
        seen.charge_body = Some(body);
        Json(charge)
    }

    async fn list(State(seen): State<Shared>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        seen.lock().await.list_query = Some(query);
        Json(json!({ "data": [] }))
    }

    async fn refund_declined() -> (StatusCode, Json<Value>) {
        (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": { "code": "charge_disputed", "message": "Charge is disputed." } })),
        )
    }

    async fn stub_gateway() -> (HttpGatewayClient, Shared) {
        let seen = Shared::default();
        let router = Router::new()
            .route("/v1/charges", post(create).get(list))
            .route("/v1/refunds", post(refund_declined))
            .with_state(Arc::clone(&seen));
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("stub gateway should bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("stub gateway address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        let Ok(client) = HttpGatewayClient::new(format!("http://{addr}"), "sk_test", Duration::from_secs(5))
        else {
            panic!("client should build");
        };
        (client, seen)
    }

    #[tokio::test]
    async fn charge_sends_idempotency_header_and_bearer_token() {
        let (client, seen) = stub_gateway().await;
        let key = IdempotencyKey::from_raw("V1_abc123");
        let request = ChargeRequest {
            amount: 2500,
            currency: "usd".to_string(),
            customer_id: "cus_1".to_string(),
            metadata: BTreeMap::from([("venue_id".to_string(), "v1".to_string())]),
            idempotency_key: key.clone(),
        };

        let Ok(charge) = client.create_charge(&request).await else {
            panic!("charge should succeed");
        };
        assert_eq!(charge.id, "ch_remote_1");
        assert_eq!(charge.amount, 2500);

        let seen = seen.lock().await;
        assert_eq!(seen.idempotency_key.as_deref(), Some(key.as_str()));
        assert_eq!(seen.authorization.as_deref(), Some("Bearer sk_test"));
        let Some(body) = &seen.charge_body else {
            panic!("charge body not received");
        };
        assert_eq!(body["customer_id"], "cus_1");
        assert!(body.get("idempotency_key").is_none());
    }

    #[tokio::test]
    async fn listing_sends_customer_and_limit() {
        let (client, seen) = stub_gateway().await;
        let Ok(charges) = client.list_charges("cus_1", 5).await else {
            panic!("listing should succeed");
        };
        assert!(charges.is_empty());

        let seen = seen.lock().await;
        let Some(query) = &seen.list_query else {
            panic!("list query not received");
        };
        assert_eq!(query.get("customer").map(String::as_str), Some("cus_1"));
        assert_eq!(query.get("limit").map(String::as_str), Some("5"));
    }

    #[tokio::test]
    async fn error_envelope_keeps_code_and_status() {
        let (client, _seen) = stub_gateway().await;
        let Err(CoreError::Gateway(failure)) = client.refund("ch_remote_1", None).await else {
            panic!("refund should be rejected");
        };
        assert_eq!(failure.code, "charge_disputed");
        assert_eq!(failure.message, "Charge is disputed.");
        assert_eq!(failure.status, Some(402));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let Ok(client) = HttpGatewayClient::new("http://gw.local/", "sk_test", Duration::from_secs(1))
        else {
            panic!("client should build");
        };
        assert_eq!(client.url("/v1/charges"), "http://gw.local/v1/charges");
    }

    #[test]
    fn error_envelope_prefers_code_over_type() {
        let body = r#"{"error":{"code":"card_declined","type":"card_error","message":"Your card was declined."}}"#;
        let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
            panic!("envelope should parse");
        };
        assert_eq!(envelope.error.code.as_deref(), Some("card_declined"));
        assert_eq!(envelope.error.message.as_deref(), Some("Your card was declined."));
    }
}
