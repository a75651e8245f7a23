use super::pricing::PriceQuote;
use crate::errors::ServiceError;
use crate::gateway::{OrderRequest, PaymentGateway};
use crate::models::PaymentOrder;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const NOTE_COURSES: &str = "course_digest";
pub const NOTE_USER_ID: &str = "user_id";

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub currency: String,
    /// Gateway minor units per store unit (100 paise to the rupee).
    pub minor_units_per_unit: u64,
    pub timeout: Duration,
}

/// Receipt tokens only need to be unlikely to collide; the gateway
/// deduplicates by its own order id.
pub fn receipt_token() -> String {
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("rcpt_{}_{}", nonce, Utc::now().timestamp_millis())
}

/// SHA-256 hex of the ordered course ids. The gateway caps each note value at
/// 256 characters, so the list itself does not fit once a batch grows.
pub fn course_digest(course_ids: &[Uuid]) -> String {
    let mut hasher = Sha256::new();
    for (i, id) in course_ids.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(id.hyphenated().to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Opens gateway orders. Keeps no local state, so a failed call can simply
/// be retried by the client.
#[derive(Clone)]
pub struct OrderInitiator {
    gateway: Arc<dyn PaymentGateway>,
    settings: OrderSettings,
}

impl OrderInitiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, settings: OrderSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    /// Store units to gateway minor units.
    pub fn to_minor_units(&self, total: u64) -> Result<u64, ServiceError> {
        total
            .checked_mul(self.settings.minor_units_per_unit)
            .ok_or_else(|| ServiceError::ValidationError("Order total is too large".to_string()))
    }

    #[instrument(skip(self, quote), fields(total = quote.total))]
    pub async fn open_order(
        &self,
        user_id: Uuid,
        quote: &PriceQuote,
    ) -> Result<PaymentOrder, ServiceError> {
        if quote.total == 0 {
            return Err(ServiceError::ValidationError(
                "Order total must be positive".to_string(),
            ));
        }

        let request = OrderRequest {
            amount: self.to_minor_units(quote.total)?,
            currency: self.settings.currency.clone(),
            receipt: receipt_token(),
            notes: BTreeMap::from([
                (NOTE_COURSES.to_string(), course_digest(&quote.course_ids())),
                (NOTE_USER_ID.to_string(), user_id.to_string()),
            ]),
        };

        let order = match timeout(self.settings.timeout, self.gateway.create_order(request)).await {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                warn!(error = %e, "order creation failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout = ?self.settings.timeout, "order creation timed out");
                return Err(ServiceError::GatewayError(format!(
                    "order creation timed out after {:?}",
                    self.settings.timeout
                )));
            }
        };

        info!(order_id = %order.id, amount = order.amount, "payment order opened");
        Ok(order)
    }

    /// Reads an order back from the gateway under the same time bound.
    pub async fn fetch_order(&self, order_id: &str) -> Result<PaymentOrder, ServiceError> {
        match timeout(self.settings.timeout, self.gateway.fetch_order(order_id)).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(ServiceError::GatewayError(format!(
                "order lookup timed out after {:?}",
                self.settings.timeout
            ))),
        }
    }
}
