use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Per-(user, course) progress record, created once at enrollment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub id: Uuid,
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub completed_videos: BTreeSet<Uuid>,
}

impl CourseProgress {
    pub fn new(course_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id,
            user_id,
            completed_videos: BTreeSet::new(),
        }
    }
}
