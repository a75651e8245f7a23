use super::checkout::{course_digest, OrderInitiator, OrderSettings, NOTE_COURSES, NOTE_USER_ID};
use super::enrollment::EnrollmentOrchestrator;
use super::pricing::PriceAggregator;
use super::receipts::ReceiptService;
use super::signature::{PaymentProof, SignatureVerifier, VerifiedPayment};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::gateway::PaymentGateway;
use crate::metrics::CheckoutMetrics;
use crate::models::{EnrollmentReport, PaymentOrder};
use crate::notifications::NotificationDispatcher;
use crate::repositories::CourseStore;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// The three payment operations behind the HTTP surface.
#[derive(Clone)]
pub struct PaymentService {
    pricing: PriceAggregator,
    initiator: OrderInitiator,
    verifier: SignatureVerifier,
    orchestrator: EnrollmentOrchestrator,
    receipts: ReceiptService,
    metrics: CheckoutMetrics,
    recheck_order: bool,
}

impl PaymentService {
    /// Wires the components from configuration. `store` should already be
    /// bounded by the store timeout.
    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn CourseStore>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        metrics: CheckoutMetrics,
    ) -> Self {
        let settings = OrderSettings {
            currency: cfg.razorpay.currency.clone(),
            minor_units_per_unit: cfg.razorpay.minor_units_per_unit,
            timeout: cfg.razorpay.timeout(),
        };
        let notification_timeout = cfg.enrollment.notification_timeout();

        Self {
            pricing: PriceAggregator::new(store.clone()),
            initiator: OrderInitiator::new(gateway, settings),
            verifier: SignatureVerifier::new(cfg.razorpay.key_secret.clone()),
            orchestrator: EnrollmentOrchestrator::new(
                store.clone(),
                dispatcher.clone(),
                metrics.clone(),
                cfg.enrollment.policy,
                notification_timeout,
            ),
            receipts: ReceiptService::new(
                store,
                dispatcher,
                metrics.clone(),
                cfg.razorpay.minor_units_per_unit,
                notification_timeout,
            ),
            metrics,
            recheck_order: cfg.enrollment.recheck_order,
        }
    }

    /// Prices the courses and opens a gateway order for them. Ownership is
    /// checked first, so a conflict never produces a gateway call.
    #[instrument(skip(self, course_ids), fields(courses = course_ids.len()))]
    pub async fn capture(
        &self,
        user_id: Uuid,
        course_ids: &[Uuid],
    ) -> Result<PaymentOrder, ServiceError> {
        let quote = self.pricing.quote(user_id, course_ids).await?;
        match self.initiator.open_order(user_id, &quote).await {
            Ok(order) => {
                self.metrics.orders_created.inc();
                Ok(order)
            }
            Err(e) => {
                if matches!(e, ServiceError::GatewayError(_)) {
                    self.metrics.gateway_errors.inc();
                }
                Err(e)
            }
        }
    }

    /// Checks the signature, optionally re-reads the order, then enrolls.
    #[instrument(skip(self, proof), fields(order_id = %proof.order_id, user_id = %proof.user_id))]
    pub async fn verify(&self, proof: PaymentProof) -> Result<EnrollmentReport, ServiceError> {
        let verified = self.verifier.verify(proof).map_err(|e| {
            self.metrics.signature_failures.inc();
            warn!("payment signature rejected");
            e
        })?;

        if self.recheck_order {
            self.recheck(&verified).await?;
        }

        Ok(self.orchestrator.enroll(&verified).await)
    }

    pub async fn send_receipt(
        &self,
        user_id: Uuid,
        order_id: &str,
        payment_id: &str,
        amount: u64,
    ) -> Result<(), ServiceError> {
        self.receipts
            .send(user_id, order_id, payment_id, amount)
            .await
    }

    /// Compares the gateway's record of the order with the request and with
    /// today's prices.
    async fn recheck(&self, payment: &VerifiedPayment) -> Result<(), ServiceError> {
        let order = self.initiator.fetch_order(payment.order_id()).await.map_err(|e| {
            self.metrics.gateway_errors.inc();
            e
        })?;

        if order.note(NOTE_USER_ID) != Some(payment.user_id().to_string().as_str()) {
            return Err(ServiceError::Conflict(
                "Order was opened for a different user".to_string(),
            ));
        }
        if order.note(NOTE_COURSES) != Some(course_digest(payment.courses()).as_str()) {
            return Err(ServiceError::Conflict(
                "Order does not cover the submitted courses".to_string(),
            ));
        }

        let expected = self
            .initiator
            .to_minor_units(self.pricing.total(payment.courses()).await?)?;
        if order.amount != expected {
            warn!(
                order_amount = order.amount,
                expected, "order amount no longer matches course prices"
            );
            return Err(ServiceError::Conflict(
                "Order amount does not match current course prices".to_string(),
            ));
        }
        Ok(())
    }
}
