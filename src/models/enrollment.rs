use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// How a multi-course batch reacts to a failing course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first failing course; later courses are left untouched.
    #[default]
    StopOnFirstFailure,
    /// Attempt every course and report each failure.
    ContinueAndAggregate,
}

/// Result of processing one course of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentStatus {
    /// Fresh enrollment: progress created, user linked.
    Enrolled,
    /// The user already held this course; nothing was written.
    AlreadyEnrolled,
    /// The course failed and holds no partial state for this user.
    Failed(ServiceError),
    /// Skipped because an earlier course stopped the batch.
    NotAttempted,
}

impl EnrollmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::AlreadyEnrolled => "already_enrolled",
            Self::Failed(_) => "failed",
            Self::NotAttempted => "not_attempted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutcome {
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
}

/// Per-course results of one verified payment, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentReport {
    pub user_id: Uuid,
    pub policy: BatchPolicy,
    pub outcomes: Vec<CourseOutcome>,
}

impl EnrollmentReport {
    /// True when every course ended enrolled, whether now or previously.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| {
            matches!(
                o.status,
                EnrollmentStatus::Enrolled | EnrollmentStatus::AlreadyEnrolled
            )
        })
    }

    pub fn enrolled(&self) -> Vec<Uuid> {
        self.with_status(|s| matches!(s, EnrollmentStatus::Enrolled))
    }

    pub fn already_enrolled(&self) -> Vec<Uuid> {
        self.with_status(|s| matches!(s, EnrollmentStatus::AlreadyEnrolled))
    }

    pub fn not_attempted(&self) -> Vec<Uuid> {
        self.with_status(|s| matches!(s, EnrollmentStatus::NotAttempted))
    }

    pub fn failed(&self) -> Vec<(Uuid, &ServiceError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                EnrollmentStatus::Failed(err) => Some((o.course_id, err)),
                _ => None,
            })
            .collect()
    }

    pub fn first_failure(&self) -> Option<(Uuid, &ServiceError)> {
        self.failed().into_iter().next()
    }

    fn with_status(&self, pred: impl Fn(&EnrollmentStatus) -> bool) -> Vec<Uuid> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.course_id)
            .collect()
    }
}
