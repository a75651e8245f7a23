use super::{GatewayClientError, OrderRequest, PaymentGateway};
use crate::config::RazorpayConfig;
use crate::models::PaymentOrder;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RazorpayGateway {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayClientError::Transport(e.to_string()))?;
        Ok(Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(cfg: &RazorpayConfig) -> Result<Self, GatewayClientError> {
        Self::new(
            cfg.key_id.clone(),
            cfg.key_secret.clone(),
            cfg.base_url.clone(),
            Duration::from_millis(cfg.timeout_ms),
        )
    }

    async fn read_order(response: reqwest::Response) -> Result<PaymentOrder, GatewayClientError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.error.code.unwrap_or_default(),
                        e.error.description.unwrap_or_default()
                    )
                })
                .unwrap_or(text);
            warn!(status = status.as_u16(), %description, "razorpay rejected request");
            return Err(GatewayClientError::Rejected {
                status: status.as_u16(),
                description,
            });
        }

        response
            .json::<PaymentOrder>()
            .await
            .map_err(|e| GatewayClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_order(&self, request: OrderRequest) -> Result<PaymentOrder, GatewayClientError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await?;

        let order = Self::read_order(response).await?;
        info!(order_id = %order.id, "razorpay order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn fetch_order(&self, order_id: &str) -> Result<PaymentOrder, GatewayClientError> {
        let response = self
            .client
            .get(format!("{}/orders/{}", self.base_url, order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        Self::read_order(response).await
    }
}
