//! Remote payment gateway. Treated as a trusted black box: this crate only
//! creates orders and, optionally, reads them back.

use crate::errors::ServiceError;
use crate::models::PaymentOrder;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod razorpay;

pub use razorpay::RazorpayGateway;

/// Order creation request in the gateway's minor-unit convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum GatewayClientError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway rejected request with status {status}: {description}")]
    Rejected { status: u16, description: String },
    #[error("unreadable gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<GatewayClientError> for ServiceError {
    fn from(err: GatewayClientError) -> Self {
        ServiceError::GatewayError(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<PaymentOrder, GatewayClientError>;

    async fn fetch_order(&self, order_id: &str) -> Result<PaymentOrder, GatewayClientError>;
}
