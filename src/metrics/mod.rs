//! Checkout counters and their Prometheus text exposition.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters owned by one registry, so each app instance (and each test)
/// sees its own values.
#[derive(Clone)]
pub struct CheckoutMetrics {
    registry: Registry,
    pub orders_created: IntCounter,
    pub gateway_errors: IntCounter,
    pub signature_failures: IntCounter,
    pub enrollments: IntCounterVec,
    pub notification_failures: IntCounter,
}

impl CheckoutMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created = IntCounter::new(
            "checkout_orders_created_total",
            "Payment orders opened with the gateway",
        )?;
        let gateway_errors = IntCounter::new(
            "checkout_gateway_errors_total",
            "Gateway calls that failed or timed out",
        )?;
        let signature_failures = IntCounter::new(
            "checkout_signature_failures_total",
            "Verification attempts rejected for a bad signature",
        )?;
        let enrollments = IntCounterVec::new(
            Opts::new(
                "checkout_enrollments_total",
                "Per-course enrollment outcomes",
            ),
            &["outcome"],
        )?;
        let notification_failures = IntCounter::new(
            "checkout_notification_failures_total",
            "Notifications that failed or timed out",
        )?;

        registry.register(Box::new(orders_created.clone()))?;
        registry.register(Box::new(gateway_errors.clone()))?;
        registry.register(Box::new(signature_failures.clone()))?;
        registry.register(Box::new(enrollments.clone()))?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            gateway_errors,
            signature_failures,
            enrollments,
            notification_failures,
        })
    }

    pub fn record_enrollment(&self, outcome: &str) {
        self.enrollments.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
