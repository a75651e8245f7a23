//! Course/user storage behind a single trait.
//!
//! Every set-membership write is an add-if-absent primitive executed as one
//! store-level operation. Callers never read-then-write membership.

use crate::errors::ServiceError;
use crate::models::{Course, CourseProgress, User};
use async_trait::async_trait;
use sea_orm::DbErr;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

pub mod in_memory;
pub mod sql_store;

pub use in_memory::InMemoryCourseStore;
pub use sql_store::SqlCourseStore;

/// Outcome of an add-if-absent on a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Inserted,
    AlreadyPresent,
}

impl Membership {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows > 0 {
            Self::Inserted
        } else {
            Self::AlreadyPresent
        }
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::PersistenceError(err.to_string())
    }
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Adds `user_id` to the course's enrolled set if absent. `None` when the
    /// course does not exist.
    async fn add_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<(Course, Membership)>, StoreError>;

    /// Returns the single progress record for the pair, creating an empty one
    /// only when none exists.
    async fn ensure_progress(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<CourseProgress, StoreError>;

    /// Adds the course and its progress reference to the user's sets if
    /// absent. `None` when the user does not exist.
    async fn link_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        progress_id: Uuid,
    ) -> Result<Option<User>, StoreError>;

    /// Drops a membership that can never be completed, such as one for a
    /// user that does not exist.
    async fn remove_enrolled_student(&self, course_id: Uuid, user_id: Uuid)
        -> Result<(), StoreError>;

    async fn progress_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<CourseProgress>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Decorator that bounds every call of the inner store.
#[derive(Clone)]
pub struct BoundedStore {
    inner: Arc<dyn CourseStore>,
    limit: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn CourseStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        timeout(self.limit, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl CourseStore for BoundedStore {
    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError> {
        self.bounded(self.inner.find_course(course_id)).await
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.bounded(self.inner.find_user(user_id)).await
    }

    async fn add_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<(Course, Membership)>, StoreError> {
        self.bounded(self.inner.add_enrolled_student(course_id, user_id))
            .await
    }

    async fn ensure_progress(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<CourseProgress, StoreError> {
        self.bounded(self.inner.ensure_progress(course_id, user_id))
            .await
    }

    async fn link_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        progress_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        self.bounded(self.inner.link_enrollment(user_id, course_id, progress_id))
            .await
    }

    async fn remove_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        self.bounded(self.inner.remove_enrolled_student(course_id, user_id))
            .await
    }

    async fn progress_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<CourseProgress>, StoreError> {
        self.bounded(self.inner.progress_for(user_id, course_id))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.inner.ping()).await
    }
}
