use crate::errors::ServiceError;
use crate::metrics::CheckoutMetrics;
use crate::notifications::{NotificationDispatcher, NotificationError, PaymentReceipt};
use crate::repositories::CourseStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Renders gateway minor units as store units without dropping the fraction:
/// 200000 becomes "2000" and 199950 becomes "1999.5" at 100 per unit.
pub fn format_store_units(minor: u64, minor_units_per_unit: u64) -> String {
    let per_unit = minor_units_per_unit.max(1);
    let (whole, fraction) = (minor / per_unit, minor % per_unit);
    if fraction == 0 {
        return whole.to_string();
    }
    let width = (per_unit - 1).to_string().len();
    let scaled = u128::from(fraction) * 10u128.pow(width as u32) / u128::from(per_unit);
    let digits = format!("{scaled:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Sends the "payment received" message for a settled order.
#[derive(Clone)]
pub struct ReceiptService {
    store: Arc<dyn CourseStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    metrics: CheckoutMetrics,
    minor_units_per_unit: u64,
    timeout: Duration,
}

impl ReceiptService {
    pub fn new(
        store: Arc<dyn CourseStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        metrics: CheckoutMetrics,
        minor_units_per_unit: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics,
            minor_units_per_unit,
            timeout,
        }
    }

    /// `amount` arrives in gateway minor units and is reported in store units.
    #[instrument(skip(self))]
    pub async fn send(
        &self,
        user_id: Uuid,
        order_id: &str,
        payment_id: &str,
        amount: u64,
    ) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User not found: {user_id}")))?;

        let receipt = PaymentReceipt {
            email: user.email.clone(),
            student_name: user.display_name(),
            amount: format_store_units(amount, self.minor_units_per_unit),
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
        };

        let result = match timeout(self.timeout, self.dispatcher.payment_received(receipt)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout(self.timeout)),
        };
        if let Err(e) = result {
            self.metrics.notification_failures.inc();
            warn!(error = %e, "payment receipt not sent");
            return Err(e.into());
        }

        info!(%user_id, order_id, "payment receipt sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::notifications::EnrollmentNotice;
    use crate::repositories::InMemoryCourseStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        receipts: Mutex<Vec<PaymentReceipt>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for Capture {
        async fn enrollment_confirmed(&self, _: EnrollmentNotice) -> Result<(), NotificationError> {
            Ok(())
        }

        async fn payment_received(&self, receipt: PaymentReceipt) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Transport("connection refused".into()));
            }
            self.receipts.lock().unwrap().push(receipt);
            Ok(())
        }
    }

    fn service(dispatcher: Arc<Capture>) -> (ReceiptService, User) {
        let store = Arc::new(InMemoryCourseStore::new());
        let user = User::new("learner@example.com", "Asha", "Rao");
        store.insert_user(user.clone());
        let svc = ReceiptService::new(
            store,
            dispatcher,
            CheckoutMetrics::new().unwrap(),
            100,
            Duration::from_secs(1),
        );
        (svc, user)
    }

    #[tokio::test]
    async fn reports_amount_in_store_units() {
        let dispatcher = Arc::new(Capture::default());
        let (svc, user) = service(dispatcher.clone());
        svc.send(user.id, "order_1", "pay_1", 200_000).await.unwrap();

        let sent = dispatcher.receipts.lock().unwrap().pop().unwrap();
        assert_eq!(sent.amount, "2000");
        assert_eq!(sent.student_name, "Asha Rao");
        assert_eq!(sent.email, "learner@example.com");
    }

    #[tokio::test]
    async fn keeps_fractional_units() {
        let dispatcher = Arc::new(Capture::default());
        let (svc, user) = service(dispatcher.clone());
        svc.send(user.id, "order_1", "pay_1", 199_950).await.unwrap();

        let sent = dispatcher.receipts.lock().unwrap().pop().unwrap();
        assert_eq!(sent.amount, "1999.5");
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_store_units(200_000, 100), "2000");
        assert_eq!(format_store_units(199_905, 100), "1999.05");
        assert_eq!(format_store_units(1, 100), "0.01");
        assert_eq!(format_store_units(1_500, 1_000), "1.5");
        assert_eq!(format_store_units(42, 1), "42");
    }

    #[tokio::test]
    async fn unknown_user_and_dispatch_failure_surface() {
        let (svc, _) = service(Arc::new(Capture::default()));
        assert_matches!(
            svc.send(Uuid::new_v4(), "order_1", "pay_1", 100).await,
            Err(ServiceError::NotFound(_))
        );

        let (svc, user) = service(Arc::new(Capture {
            fail: true,
            ..Default::default()
        }));
        assert_matches!(
            svc.send(user.id, "order_1", "pay_1", 100).await,
            Err(ServiceError::NotificationError(_))
        );
    }
}
