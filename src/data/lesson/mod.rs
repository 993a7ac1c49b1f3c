use chrono::NaiveDate;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::{Application, Class};
use crate::data::user::MediaRef;

pub mod db;

pub static LESSON_COLLECTION_NAME: &str = "lessons";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub start_time: String,
}

/// A concrete scheduled teaching session. Created when an application is
/// approved, or directly by a teacher for an already enrolled student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub owner: Uuid,
    pub student: Uuid,
    #[serde(default)]
    pub class_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub homework: String,
    #[serde(default)]
    pub files: Option<MediaRef>,
}

impl Lesson {
    /// Initial lesson for a freshly approved enrollment, scheduled at the
    /// application's requested date and time.
    pub fn from_approval(class: &Class, application: &Application) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            owner: class.owner,
            student: application.applicant,
            class_id: Some(class.id),
            title: class.title.clone(),
            description: class.description.clone(),
            schedule: vec![ScheduleEntry {
                date: application.date,
                start_time: application.start_time.clone(),
            }],
            homework: String::new(),
            files: None,
        }
    }
}
