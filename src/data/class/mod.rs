use chrono::{DateTime, NaiveDate, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::user::MediaRef;

pub mod db;
pub mod enroll;

pub static CLASS_COLLECTION_NAME: &str = "classes";

/// Class capacity mode. OneOnOne locks its time slot at application time and
/// accepts only one applicant.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    Group,
    OneOnOne,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeSlot {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
}

/// A student's pending request to enroll at a specific time slot.
/// Transient: created on apply, removed on approve or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Application {
    pub id: Uuid,
    pub applicant: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Enrollment {
    pub student: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    /// Minutes.
    pub duration: u32,
    pub ages: AgeRange,
    pub lesson_type: LessonType,

    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub other: Option<String>,

    #[serde(default)]
    pub available_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub enrolled: Vec<Enrollment>,

    #[serde(default)]
    pub image: Option<MediaRef>,
}

impl Class {
    pub fn slot(&self, slot_id: Uuid) -> Option<&TimeSlot> {
        self.available_slots.iter().find(|s| s.id == slot_id)
    }

    pub fn application(&self, application_id: Uuid) -> Option<&Application> {
        self.applications.iter().find(|a| a.id == application_id)
    }

    pub fn has_applicant(&self, applicant: Uuid) -> bool {
        self.applications.iter().any(|a| a.applicant == applicant)
    }

    pub fn is_enrolled(&self, student: Uuid) -> bool {
        self.enrolled.iter().any(|e| e.student == student)
    }
}
