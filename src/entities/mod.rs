//! sea-orm entities backing [`crate::repositories::SqlCourseStore`].
//!
//! Set membership lives in join tables with composite primary keys so that
//! add-if-absent is a single `INSERT ... ON CONFLICT DO NOTHING`.

pub mod course;
pub mod course_enrollment;
pub mod course_progress;
pub mod user;
pub mod user_course;
