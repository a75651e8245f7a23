//! Domain types shared by the services, the stores and the HTTP layer.

pub mod course;
pub mod course_progress;
pub mod enrollment;
pub mod payment_order;
pub mod user;

pub use course::Course;
pub use course_progress::CourseProgress;
pub use enrollment::{BatchPolicy, CourseOutcome, EnrollmentReport, EnrollmentStatus};
pub use payment_order::PaymentOrder;
pub use user::User;
