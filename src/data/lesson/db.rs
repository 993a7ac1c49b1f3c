use bson::doc;
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::data::user::db::UserDbExt;
use crate::data::user::MediaRef;
use crate::resp::problem::Problem;

use super::{Lesson, ScheduleEntry, LESSON_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Lesson doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn no_shared_class() -> Problem {
        Problem::new_untyped(
            Status::NotFound,
            "No class found with this student and teacher combination.",
        )
    }

    #[inline]
    pub fn duplicate_lesson() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "Lesson with this student, title, and schedule already exists.",
        )
    }

    #[inline]
    pub fn not_owner() -> Problem {
        Problem::new_untyped(Status::Forbidden, "Lesson not owned by user.")
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LessonCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub homework: String,
}

/// Partial lesson update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LessonUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub schedule: Option<Vec<ScheduleEntry>>,
    pub homework: Option<String>,
    pub files: Option<MediaRef>,
}

impl LessonUpdateData {
    pub fn apply_to(self, lesson: &mut Lesson) {
        if let Some(title) = self.title {
            lesson.title = title;
        }
        if let Some(description) = self.description {
            lesson.description = description;
        }
        if let Some(schedule) = self.schedule {
            lesson.schedule = schedule;
        }
        if let Some(homework) = self.homework {
            lesson.homework = homework;
        }
        if let Some(files) = self.files {
            lesson.files = Some(files);
        }
    }
}

/// JSON view of a lesson with plain string ids.
#[derive(Debug, Serialize, ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub owner: Uuid,
    pub student: Uuid,
    pub class_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub schedule: Vec<ScheduleEntry>,
    pub homework: String,
    pub files: Option<MediaRef>,
}

impl From<Lesson> for LessonResponse {
    fn from(value: Lesson) -> Self {
        Self {
            id: value.id,
            owner: value.owner,
            student: value.student,
            class_id: value.class_id,
            title: value.title,
            description: value.description,
            schedule: value.schedule,
            homework: value.homework,
            files: value.files,
        }
    }
}

pub trait LessonDbExt {
    async fn lessons_for_student(
        &self,
        owner: Uuid,
        student: Uuid,
    ) -> Result<Vec<Lesson>, Problem>;

    async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>, Problem>;

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<(), Problem>;

    /// Ad-hoc lesson creation. The student must be enrolled in one of the
    /// teacher's classes.
    async fn create_lesson(
        &self,
        owner: Uuid,
        student: Uuid,
        data: LessonCreateData,
    ) -> Result<Lesson, Problem>;

    /// Replaces the whole stored document with the given state.
    async fn save_lesson(&self, lesson: &Lesson) -> Result<(), Problem>;

    /// Removes the lesson and drops it from the student's lesson list.
    async fn delete_lesson(&self, lesson: &Lesson) -> Result<(), Problem>;
}

impl LessonDbExt for Database {
    async fn lessons_for_student(
        &self,
        owner: Uuid,
        student: Uuid,
    ) -> Result<Vec<Lesson>, Problem> {
        let mut cursor = self
            .collection::<Lesson>(LESSON_COLLECTION_NAME)
            .find(
                doc! {
                    "owner": owner.to_string(),
                    "student": student.to_string(),
                },
                None,
            )
            .await
            .map_err(Problem::from)?;

        let mut lessons: Vec<Lesson> = vec![];
        while let Some(lesson) = cursor.next().await {
            match lesson {
                Ok(lesson) => lessons.push(lesson),
                Err(_) => tracing::warn!("Unable to deserialize Lesson document."),
            }
        }

        Ok(lessons)
    }

    async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>, Problem> {
        self.collection(LESSON_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<(), Problem> {
        self.collection::<Lesson>(LESSON_COLLECTION_NAME)
            .insert_one(lesson, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn create_lesson(
        &self,
        owner: Uuid,
        student: Uuid,
        data: LessonCreateData,
    ) -> Result<Lesson, Problem> {
        let shared_class = self
            .collection::<crate::data::class::Class>(crate::data::class::CLASS_COLLECTION_NAME)
            .find_one(
                doc! {
                    "owner": owner.to_string(),
                    "enrolled.student": student.to_string(),
                },
                None,
            )
            .await
            .map_err(Problem::from)?
            .ok_or_else(problem::no_shared_class)?;

        let schedule = bson::to_bson(&data.schedule).map_err(|e| {
            tracing::error!("unable to serialize lesson schedule: {}", e);
            crate::resp::problem::problems::internal("Unable to store lesson.")
        })?;
        let duplicate = self
            .collection::<Lesson>(LESSON_COLLECTION_NAME)
            .find_one(
                doc! {
                    "student": student.to_string(),
                    "title": &data.title,
                    "schedule": schedule,
                },
                None,
            )
            .await
            .map_err(Problem::from)?;
        if duplicate.is_some() {
            return Err(problem::duplicate_lesson());
        }

        let lesson = Lesson {
            id: Uuid::new_v4(),
            owner,
            student,
            class_id: Some(shared_class.id),
            title: data.title,
            description: data.description,
            schedule: data.schedule,
            homework: data.homework,
            files: None,
        };

        self.insert_lesson(&lesson).await?;

        // Manual back-reference: the student's my_lessons list.
        if let Some(mut user) = self.get_user(student).await? {
            if let Some(profile) = user.student_profile_mut() {
                if !profile.my_lessons.contains(&lesson.id) {
                    profile.my_lessons.push(lesson.id);
                    self.save_user(&user).await?;
                }
            }
        }

        Ok(lesson)
    }

    async fn save_lesson(&self, lesson: &Lesson) -> Result<(), Problem> {
        self.collection::<Lesson>(LESSON_COLLECTION_NAME)
            .find_one_and_replace(filter::by_id(lesson.id), lesson, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(lesson.id))?;

        Ok(())
    }

    async fn delete_lesson(&self, lesson: &Lesson) -> Result<(), Problem> {
        self.collection::<Lesson>(LESSON_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(lesson.id), None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(lesson.id))?;

        if let Some(mut user) = self.get_user(lesson.student).await? {
            if let Some(profile) = user.student_profile_mut() {
                profile.my_lessons.retain(|l| *l != lesson.id);
                self.save_user(&user).await?;
            }
        }

        Ok(())
    }
}
