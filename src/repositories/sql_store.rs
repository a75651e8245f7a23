use super::{CourseStore, Membership, StoreError};
use crate::db::DbPool;
use crate::entities::{course, course_enrollment, course_progress, user, user_course};
use crate::models::{Course, CourseProgress, User};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// sea-orm backed store. Membership rows carry composite primary keys, so
/// add-if-absent is an `INSERT ... ON CONFLICT DO NOTHING` and the affected
/// row count tells a fresh insert from an existing one.
#[derive(Debug, Clone)]
pub struct SqlCourseStore {
    db: Arc<DbPool>,
}

impl SqlCourseStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn insert_course(&self, course: &Course) -> Result<(), StoreError> {
        let price = i64::try_from(course.price)
            .map_err(|_| StoreError::InvalidRecord(format!("price out of range: {}", course.price)))?;
        course::Entity::insert(course::ActiveModel {
            id: Set(course.id),
            name: Set(course.name.clone()),
            price: Set(price),
            created_at: Set(Utc::now()),
        })
        .exec_without_returning(self.db.as_ref())
        .await?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        user::Entity::insert(user::ActiveModel {
            id: Set(user.id),
            email: Set(user.email.clone()),
            first_name: Set(user.first_name.clone()),
            last_name: Set(user.last_name.clone()),
            created_at: Set(Utc::now()),
        })
        .exec_without_returning(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn enrolled_students(&self, course_id: Uuid) -> Result<BTreeSet<Uuid>, StoreError> {
        let ids: Vec<Uuid> = course_enrollment::Entity::find()
            .select_only()
            .column(course_enrollment::Column::UserId)
            .filter(course_enrollment::Column::CourseId.eq(course_id))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn load_course(&self, model: course::Model) -> Result<Course, StoreError> {
        let price = u64::try_from(model.price)
            .map_err(|_| StoreError::InvalidRecord(format!("negative price on course {}", model.id)))?;
        Ok(Course {
            enrolled_students: self.enrolled_students(model.id).await?,
            id: model.id,
            name: model.name,
            price,
        })
    }
}

/// Runs an insert that may hit a conflict and reports whether a row landed.
fn rows_inserted(result: Result<u64, DbErr>) -> Result<Membership, StoreError> {
    match result {
        Ok(rows) => Ok(Membership::from_rows_affected(rows)),
        Err(DbErr::RecordNotInserted) => Ok(Membership::AlreadyPresent),
        Err(e) => Err(e.into()),
    }
}

fn progress_from_model(model: course_progress::Model) -> Result<CourseProgress, StoreError> {
    let completed_videos: BTreeSet<Uuid> = serde_json::from_value(model.completed_videos)
        .map_err(|e| StoreError::InvalidRecord(format!("completed_videos: {e}")))?;
    Ok(CourseProgress {
        id: model.id,
        course_id: model.course_id,
        user_id: model.user_id,
        completed_videos,
    })
}

#[async_trait]
impl CourseStore for SqlCourseStore {
    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError> {
        match course::Entity::find_by_id(course_id)
            .one(self.db.as_ref())
            .await?
        {
            Some(model) => Ok(Some(self.load_course(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let Some(model) = user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        let links = user_course::Entity::find()
            .filter(user_course::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?;

        Ok(Some(User {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            courses: links.iter().map(|l| l.course_id).collect(),
            course_progress: links.iter().map(|l| l.progress_id).collect(),
        }))
    }

    /// The course lookup and the membership insert share one transaction, and
    /// the course row is share-locked where the backend supports it, so a
    /// course deleted in between cannot end up with a membership row.
    #[instrument(skip(self))]
    async fn add_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<(Course, Membership)>, StoreError> {
        let txn = self.db.begin().await?;
        let Some(model) = course::Entity::find_by_id(course_id)
            .lock_shared()
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(None);
        };

        let membership = rows_inserted(
            course_enrollment::Entity::insert(course_enrollment::ActiveModel {
                course_id: Set(course_id),
                user_id: Set(user_id),
                enrolled_at: Set(Utc::now()),
            })
            .on_conflict(
                OnConflict::columns([
                    course_enrollment::Column::CourseId,
                    course_enrollment::Column::UserId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await,
        )?;
        txn.commit().await?;
        debug!(?membership, "enrolled set updated");

        Ok(Some((self.load_course(model).await?, membership)))
    }

    #[instrument(skip(self))]
    async fn ensure_progress(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<CourseProgress, StoreError> {
        let fresh = CourseProgress::new(course_id, user_id);
        rows_inserted(
            course_progress::Entity::insert(course_progress::ActiveModel {
                user_id: Set(user_id),
                course_id: Set(course_id),
                id: Set(fresh.id),
                completed_videos: Set(serde_json::json!([])),
                created_at: Set(Utc::now()),
            })
            .on_conflict(
                OnConflict::columns([
                    course_progress::Column::UserId,
                    course_progress::Column::CourseId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await,
        )?;

        let model = course_progress::Entity::find_by_id((user_id, course_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                StoreError::InvalidRecord(format!(
                    "progress for user {user_id} course {course_id} vanished after insert"
                ))
            })?;
        progress_from_model(model)
    }

    #[instrument(skip(self))]
    async fn link_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        progress_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin().await?;
        if user::Entity::find_by_id(user_id)
            .lock_shared()
            .one(&txn)
            .await?
            .is_none()
        {
            txn.rollback().await?;
            return Ok(None);
        }

        rows_inserted(
            user_course::Entity::insert(user_course::ActiveModel {
                user_id: Set(user_id),
                course_id: Set(course_id),
                progress_id: Set(progress_id),
                linked_at: Set(Utc::now()),
            })
            .on_conflict(
                OnConflict::columns([user_course::Column::UserId, user_course::Column::CourseId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await,
        )?;
        txn.commit().await?;

        self.find_user(user_id).await
    }

    #[instrument(skip(self))]
    async fn remove_enrolled_student(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        course_enrollment::Entity::delete_by_id((course_id, user_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn progress_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<CourseProgress>, StoreError> {
        course_progress::Entity::find_by_id((user_id, course_id))
            .one(self.db.as_ref())
            .await?
            .map(progress_from_model)
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }
}
