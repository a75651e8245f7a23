use super::{CourseStore, Membership, StoreError};
use crate::models::{Course, CourseProgress, User};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Process-local store. Each add-if-absent runs under the shard lock of the
/// entry it touches, so concurrent callers observe exactly one insertion.
#[derive(Debug, Default)]
pub struct InMemoryCourseStore {
    courses: DashMap<Uuid, Course>,
    users: DashMap<Uuid, User>,
    progress: DashMap<(Uuid, Uuid), CourseProgress>,
}

impl InMemoryCourseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_course(&self, course: Course) {
        self.courses.insert(course.id, course);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Drops a course from the catalog, as the catalog subsystem would.
    pub fn delete_course(&self, course_id: Uuid) -> Option<Course> {
        self.courses.remove(&course_id).map(|(_, c)| c)
    }

    pub fn progress_records(&self) -> usize {
        self.progress.len()
    }
}

#[async_trait]
impl CourseStore for InMemoryCourseStore {
    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError> {
        Ok(self.courses.get(&course_id).map(|c| c.clone()))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn add_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<(Course, Membership)>, StoreError> {
        let Some(mut course) = self.courses.get_mut(&course_id) else {
            return Ok(None);
        };
        let membership = if course.enrolled_students.insert(user_id) {
            Membership::Inserted
        } else {
            Membership::AlreadyPresent
        };
        debug!(%course_id, %user_id, ?membership, "enrolled set updated");
        Ok(Some((course.clone(), membership)))
    }

    async fn ensure_progress(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<CourseProgress, StoreError> {
        let progress = self
            .progress
            .entry((user_id, course_id))
            .or_insert_with(|| CourseProgress::new(course_id, user_id));
        Ok(progress.clone())
    }

    async fn link_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        progress_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.courses.insert(course_id);
        user.course_progress.insert(progress_id);
        Ok(Some(user.clone()))
    }

    async fn remove_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        if let Some(mut course) = self.courses.get_mut(&course_id) {
            course.enrolled_students.remove(&user_id);
        }
        Ok(())
    }

    async fn progress_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<CourseProgress>, StoreError> {
        Ok(self.progress.get(&(user_id, course_id)).map(|p| p.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
