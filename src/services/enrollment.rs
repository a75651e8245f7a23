//! Enrollment of a verified payment's courses.
//!
//! Per course the order is fixed: add the user to the course's enrolled set
//! (add-if-absent), ensure the progress record, link course and progress to
//! the user, then notify. Every attempt runs the progress and link steps,
//! both keyed add-if-absent writes, so a retry or duplicate callback repairs
//! an enrollment an earlier attempt left incomplete. Only a fresh insertion
//! sends the confirmation.

use super::signature::VerifiedPayment;
use crate::errors::ServiceError;
use crate::metrics::CheckoutMetrics;
use crate::models::{
    BatchPolicy, Course, CourseOutcome, EnrollmentReport, EnrollmentStatus, User,
};
use crate::notifications::{EnrollmentNotice, NotificationDispatcher, NotificationError};
use crate::repositories::CourseStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct EnrollmentOrchestrator {
    store: Arc<dyn CourseStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    metrics: CheckoutMetrics,
    policy: BatchPolicy,
    notification_timeout: Duration,
}

impl EnrollmentOrchestrator {
    pub fn new(
        store: Arc<dyn CourseStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        metrics: CheckoutMetrics,
        policy: BatchPolicy,
        notification_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics,
            policy,
            notification_timeout,
        }
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Processes the batch in submission order and reports every course.
    /// Never fails as a whole: per-course failures land in the report.
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id(), user_id = %payment.user_id()))]
    pub async fn enroll(&self, payment: &VerifiedPayment) -> EnrollmentReport {
        let user_id = payment.user_id();
        let mut outcomes = Vec::with_capacity(payment.courses().len());
        let mut stopped = false;

        for &course_id in payment.courses() {
            let status = if stopped {
                EnrollmentStatus::NotAttempted
            } else {
                match self.enroll_course(course_id, user_id).await {
                    Ok(status) => status,
                    Err(err) => {
                        warn!(%course_id, error = %err, "course enrollment failed");
                        stopped = self.policy == BatchPolicy::StopOnFirstFailure;
                        EnrollmentStatus::Failed(err)
                    }
                }
            };
            self.metrics.record_enrollment(status.label());
            outcomes.push(CourseOutcome { course_id, status });
        }

        let report = EnrollmentReport {
            user_id,
            policy: self.policy,
            outcomes,
        };
        info!(
            enrolled = report.enrolled().len(),
            already_enrolled = report.already_enrolled().len(),
            failed = report.failed().len(),
            complete = report.is_complete(),
            "enrollment batch processed"
        );
        report
    }

    async fn enroll_course(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<EnrollmentStatus, ServiceError> {
        let (course, membership) = self
            .store
            .add_enrolled_student(course_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Course not found: {course_id}")))?;

        let completed = self.complete_enrollment(course_id, user_id).await;
        if let Err(ServiceError::NotFound(_)) = &completed {
            self.discard_membership(course_id, user_id).await;
        }
        let user = completed?;

        if !membership.is_fresh() {
            info!(%course_id, %user_id, "already enrolled");
            return Ok(EnrollmentStatus::AlreadyEnrolled);
        }

        self.notify(&course, &user).await;
        Ok(EnrollmentStatus::Enrolled)
    }

    /// Progress first, then the user link, so the user never references a
    /// progress record that does not exist.
    async fn complete_enrollment(&self, course_id: Uuid, user_id: Uuid) -> Result<User, ServiceError> {
        let progress = self.store.ensure_progress(course_id, user_id).await?;
        self.store
            .link_enrollment(user_id, course_id, progress.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User not found: {user_id}")))
    }

    /// The user does not exist, so no attempt can ever complete this
    /// membership. Other failures keep it for the next attempt to finish.
    async fn discard_membership(&self, course_id: Uuid, user_id: Uuid) {
        match self.store.remove_enrolled_student(course_id, user_id).await {
            Ok(()) => warn!(%course_id, %user_id, "membership of unknown user removed"),
            Err(e) => error!(
                %course_id,
                %user_id,
                error = %e,
                "could not remove membership of unknown user"
            ),
        }
    }

    async fn notify(&self, course: &Course, user: &User) {
        let notice = EnrollmentNotice {
            email: user.email.clone(),
            student_name: user.display_name(),
            course_id: course.id,
            course_name: course.name.clone(),
        };
        let result = match timeout(
            self.notification_timeout,
            self.dispatcher.enrollment_confirmed(notice),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout(self.notification_timeout)),
        };

        if let Err(e) = result {
            self.metrics.notification_failures.inc();
            warn!(
                course_id = %course.id,
                user_id = %user.id,
                error = %e,
                "enrollment confirmation not sent"
            );
        }
    }
}
