use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Order as held by the payment gateway. Only `id` is kept locally, and only
/// for the lifetime of a capture/verify exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentOrder {
    pub id: String,
    /// Gateway minor units (paise for INR).
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub notes: serde_json::Value,
}

impl PaymentOrder {
    /// String-valued note, if present. The gateway returns `notes` as either an
    /// object or an empty array.
    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).and_then(|v| v.as_str())
    }
}
