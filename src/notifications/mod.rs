//! Outbound enrollment and receipt notifications.
//!
//! Rendering and delivering email is somebody else's job: dispatchers either
//! log the event or hand it to an HTTP relay.

use crate::errors::ServiceError;
use crate::services::signature::hmac_sha256_hex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentNotice {
    pub email: String,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_name: String,
}

/// Receipt for a settled payment. `amount` is the paid amount in store units,
/// formatted with its fractional part when there is one ("1999.5").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub email: String,
    pub student_name: String,
    pub amount: String,
    pub order_id: String,
    pub payment_id: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification relay answered {0}")]
    Rejected(u16),
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        ServiceError::NotificationError(err.to_string())
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn enrollment_confirmed(&self, notice: EnrollmentNotice) -> Result<(), NotificationError>;

    async fn payment_received(&self, receipt: PaymentReceipt) -> Result<(), NotificationError>;
}

/// Records notifications as structured log events only.
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn enrollment_confirmed(&self, notice: EnrollmentNotice) -> Result<(), NotificationError> {
        info!(
            email = %notice.email,
            course_id = %notice.course_id,
            course = %notice.course_name,
            "enrollment confirmation queued"
        );
        Ok(())
    }

    async fn payment_received(&self, receipt: PaymentReceipt) -> Result<(), NotificationError> {
        info!(
            email = %receipt.email,
            order_id = %receipt.order_id,
            payment_id = %receipt.payment_id,
            amount = %receipt.amount,
            "payment receipt queued"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayEvent {
    EnrollmentConfirmed(EnrollmentNotice),
    PaymentReceived(PaymentReceipt),
}

/// Posts each notification as JSON to a relay that owns templating and
/// delivery. When a secret is configured the body is HMAC-signed in
/// [`SIGNATURE_HEADER`].
#[derive(Clone)]
pub struct HttpRelayDispatcher {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl std::fmt::Debug for HttpRelayDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayDispatcher")
            .field("url", &self.url)
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

impl HttpRelayDispatcher {
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            secret,
        })
    }

    #[instrument(skip(self, event))]
    async fn post(&self, event: RelayEvent) -> Result<(), NotificationError> {
        let body = serde_json::to_vec(&event)?;
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, hmac_sha256_hex(secret.as_bytes(), &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "notification relay rejected event");
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for HttpRelayDispatcher {
    async fn enrollment_confirmed(&self, notice: EnrollmentNotice) -> Result<(), NotificationError> {
        self.post(RelayEvent::EnrollmentConfirmed(notice)).await
    }

    async fn payment_received(&self, receipt: PaymentReceipt) -> Result<(), NotificationError> {
        self.post(RelayEvent::PaymentReceived(receipt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn receipt() -> PaymentReceipt {
        PaymentReceipt {
            email: "learner@example.com".into(),
            student_name: "Asha Rao".into(),
            amount: "1999.5".into(),
            order_id: "order_1".into(),
            payment_id: "pay_1".into(),
        }
    }

    #[tokio::test]
    async fn relay_signs_tagged_events() {
        let server = MockServer::start().await;
        let expected = serde_json::to_vec(&RelayEvent::PaymentReceived(receipt())).unwrap();
        let signature = hmac_sha256_hex(b"relay-secret", &expected);

        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(header(SIGNATURE_HEADER, signature.as_str()))
            .and(body_partial_json(json!({
                "type": "payment_received",
                "amount": "1999.5",
                "order_id": "order_1"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let relay = HttpRelayDispatcher::new(
            format!("{}/notify", server.uri()),
            Some("relay-secret".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        relay.payment_received(receipt()).await.unwrap();
    }

    #[tokio::test]
    async fn relay_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let relay =
            HttpRelayDispatcher::new(server.uri(), None, Duration::from_secs(2)).unwrap();
        let err = relay
            .enrollment_confirmed(EnrollmentNotice {
                email: "learner@example.com".into(),
                student_name: "Asha Rao".into(),
                course_id: Uuid::new_v4(),
                course_name: "Rust for Web".into(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, NotificationError::Rejected(503));
        assert_eq!(ServiceError::from(err).kind(), "notification_error");
    }

    #[tokio::test]
    async fn log_dispatcher_always_succeeds() {
        assert!(LogDispatcher.payment_received(receipt()).await.is_ok());
    }
}
