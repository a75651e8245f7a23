use crate::errors::ServiceError;
use crate::models::Course;
use crate::repositories::CourseStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Validated courses and their summed price in store units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub total: u64,
    pub courses: Vec<Course>,
}

impl PriceQuote {
    pub fn course_ids(&self) -> Vec<Uuid> {
        self.courses.iter().map(|c| c.id).collect()
    }
}

/// Read-only pricing over the course store.
#[derive(Clone)]
pub struct PriceAggregator {
    store: Arc<dyn CourseStore>,
}

impl PriceAggregator {
    pub fn new(store: Arc<dyn CourseStore>) -> Self {
        Self { store }
    }

    /// Resolves every course, rejects any the user already owns, and sums
    /// the prices. Runs before an order exists, so a rejection here never
    /// leaves a paid order behind.
    #[instrument(skip(self, course_ids), fields(courses = course_ids.len()))]
    pub async fn quote(&self, user_id: Uuid, course_ids: &[Uuid]) -> Result<PriceQuote, ServiceError> {
        self.resolve(course_ids, Some(user_id)).await
    }

    /// Current total for the courses without the ownership check.
    pub async fn total(&self, course_ids: &[Uuid]) -> Result<u64, ServiceError> {
        Ok(self.resolve(course_ids, None).await?.total)
    }

    async fn resolve(
        &self,
        course_ids: &[Uuid],
        buyer: Option<Uuid>,
    ) -> Result<PriceQuote, ServiceError> {
        if course_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "Please provide Course ID".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(course_ids.len());
        if let Some(dup) = course_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ServiceError::ValidationError(format!(
                "Course listed more than once: {dup}"
            )));
        }

        let mut total: u64 = 0;
        let mut courses = Vec::with_capacity(course_ids.len());
        for &course_id in course_ids {
            let course = self
                .store
                .find_course(course_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Could not find the course: {course_id}"))
                })?;

            if let Some(user_id) = buyer {
                if course.is_enrolled(user_id) {
                    return Err(ServiceError::Conflict(format!(
                        "Student is already enrolled in course {course_id}"
                    )));
                }
            }

            total = total.checked_add(course.price).ok_or_else(|| {
                ServiceError::ValidationError("Order total is too large".to_string())
            })?;
            courses.push(course);
        }

        debug!(total, "courses priced");
        Ok(PriceQuote { total, courses })
    }
}
