use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{Customer, GatewayError, PaymentGateway};

pub const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com/snap/v1";

#[derive(Debug, Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
}

#[derive(Debug, Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

/// Response from the Snap `/transactions` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SnapResponse {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct SnapErrorBody {
    #[serde(default)]
    error_messages: Vec<String>,
}

/// HTTP client for the Midtrans Snap API
#[derive(Clone)]
pub struct SnapClient {
    client: Client,
    base_url: String,
    server_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl SnapClient {
    /// Creates a new SnapClient with the default circuit breaker (3 failures, 60-120s backoff)
    pub fn new(base_url: String, server_key: String) -> Self {
        Self::with_circuit_breaker(base_url, server_key, 3, 60)
    }

    /// Creates a new SnapClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        server_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        SnapClient {
            client,
            base_url,
            server_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Opens a Snap payment session and returns the token and redirect URL
    pub async fn create_transaction(
        &self,
        order_id: &str,
        gross_amount: &BigDecimal,
        customer: &Customer,
    ) -> Result<SnapResponse, GatewayError> {
        // Snap takes whole currency units; a fraction would be silently dropped.
        let whole = gross_amount.with_scale(0);
        if &whole != gross_amount {
            return Err(GatewayError::InvalidAmount(format!(
                "{gross_amount} is not a whole currency amount"
            )));
        }
        let gross_amount = whole
            .to_i64()
            .ok_or_else(|| GatewayError::InvalidAmount(format!("{gross_amount} is out of range")))?;

        let body = serde_json::to_value(SnapRequest {
            transaction_details: TransactionDetails {
                order_id,
                gross_amount,
            },
            customer_details: CustomerDetails {
                first_name: &customer.name,
                email: &customer.email,
                phone: &customer.phone,
            },
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let url = format!("{}/transactions", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let server_key = self.server_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .basic_auth(server_key, Some(""))
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let message = match response.json::<SnapErrorBody>().await {
                        Ok(err) if !err.error_messages.is_empty() => err.error_messages.join("; "),
                        _ => status.to_string(),
                    };
                    return Err(GatewayError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }

                response
                    .json::<SnapResponse>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
            })
            .await;

        match result {
            Ok(session) => Ok(session),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(
                "Midtrans Snap circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for SnapClient {
    async fn create_payment_session(
        &self,
        order_id: &str,
        gross_amount: &BigDecimal,
        customer: &Customer,
    ) -> Result<String, GatewayError> {
        let session = self.create_transaction(order_id, gross_amount, customer).await?;
        tracing::info!(order_id, "payment session created");
        Ok(session.redirect_url)
    }
}
