use bson::{doc, Document};
use chrono::NaiveDate;
use mongodb::options::FindOptions;
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::data::user::db::UserDbExt;
use crate::data::user::MediaRef;
use crate::middleware::paging::PageState;
use crate::resp::problem::Problem;

use super::{
    AgeRange, Application, Class, Enrollment, LessonType, TimeSlot, CLASS_COLLECTION_NAME,
};

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn duplicate_class() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "Class with this title and description already exists.",
        )
    }

    #[inline]
    pub fn bad_field(field: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad class data.")
            .insert_str("field", field)
            .detail(detail)
            .to_owned()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TimeSlotData {
    pub date: NaiveDate,
    pub start_time: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassCreateData {
    pub title: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub duration: u32,
    pub ages: AgeRange,
    pub lesson_type: LessonType,
    pub goal: Option<String>,
    pub experience: Option<String>,
    pub other: Option<String>,
    #[serde(default)]
    pub available_slots: Vec<TimeSlotData>,
    pub image: Option<MediaRef>,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.title.len() < 2 || self.title.len() > 100 {
            return Err(problem::bad_field(
                "title",
                "Title must be between 2 and 100 characters long.",
            ));
        }
        if self.description.len() < 2 || self.description.len() > 200 {
            return Err(problem::bad_field(
                "description",
                "Description must be between 2 and 200 characters long.",
            ));
        }
        if self.price < 0.0 {
            return Err(problem::bad_field("price", "Price must be at least 0."));
        }
        if self.ages.min > self.ages.max {
            return Err(problem::bad_field(
                "ages",
                "Minimum age cannot exceed maximum age.",
            ));
        }

        Ok(())
    }

    pub fn into_class(self, owner: Uuid) -> Class {
        Class {
            id: Uuid::new_v4(),
            owner,
            title: self.title,
            category: self.category,
            description: self.description,
            price: self.price,
            duration: self.duration,
            ages: self.ages,
            lesson_type: self.lesson_type,
            goal: self.goal,
            experience: self.experience,
            other: self.other,
            available_slots: self
                .available_slots
                .into_iter()
                .map(|s| TimeSlot {
                    id: Uuid::new_v4(),
                    date: s.date,
                    start_time: s.start_time,
                })
                .collect(),
            applications: vec![],
            enrolled: vec![],
            image: self.image,
        }
    }
}

/// Partial class update; absent fields are left untouched. Applications and
/// enrollments are only reachable through the enrollment workflow.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ClassUpdateData {
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<u32>,
    pub ages: Option<AgeRange>,
    pub goal: Option<String>,
    pub experience: Option<String>,
    pub other: Option<String>,
    pub available_slots: Option<Vec<TimeSlotData>>,
    pub image: Option<MediaRef>,
}

impl ClassUpdateData {
    pub fn apply_to(self, class: &mut Class) {
        if let Some(title) = self.title {
            class.title = title;
        }
        if let Some(category) = self.category {
            class.category = category;
        }
        if let Some(description) = self.description {
            class.description = description;
        }
        if let Some(price) = self.price {
            class.price = price;
        }
        if let Some(duration) = self.duration {
            class.duration = duration;
        }
        if let Some(ages) = self.ages {
            class.ages = ages;
        }
        if let Some(goal) = self.goal {
            class.goal = Some(goal);
        }
        if let Some(experience) = self.experience {
            class.experience = Some(experience);
        }
        if let Some(other) = self.other {
            class.other = Some(other);
        }
        if let Some(slots) = self.available_slots {
            class.available_slots = slots
                .into_iter()
                .map(|s| TimeSlot {
                    id: Uuid::new_v4(),
                    date: s.date,
                    start_time: s.start_time,
                })
                .collect();
        }
        if let Some(image) = self.image {
            class.image = Some(image);
        }
    }
}

/// JSON view of a class with plain string ids.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClassResponse {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub duration: u32,
    pub ages: AgeRange,
    pub lesson_type: LessonType,
    pub goal: Option<String>,
    pub experience: Option<String>,
    pub other: Option<String>,
    pub available_slots: Vec<TimeSlot>,
    pub applications: Vec<Application>,
    pub enrolled: Vec<Enrollment>,
    pub image: Option<MediaRef>,
}

impl From<Class> for ClassResponse {
    fn from(value: Class) -> Self {
        Self {
            id: value.id,
            owner: value.owner,
            title: value.title,
            category: value.category,
            description: value.description,
            price: value.price,
            duration: value.duration,
            ages: value.ages,
            lesson_type: value.lesson_type,
            goal: value.goal,
            experience: value.experience,
            other: value.other,
            available_slots: value.available_slots,
            applications: value.applications,
            enrolled: value.enrolled,
            image: value.image,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassPage {
    pub classes: Vec<ClassResponse>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
}

fn class_sort_key(requested: Option<&str>) -> &'static str {
    match requested {
        Some("price") => "price",
        Some("category") => "category",
        _ => "title",
    }
}

fn search_filter(search: Option<&str>) -> Option<Document> {
    let search = search?;
    // Case-insensitive free-text match on title, category and description.
    let regex = doc! { "$regex": search, "$options": "i" };
    Some(doc! {
        "$or": [
            { "title": regex.clone() },
            { "category": regex.clone() },
            { "description": regex },
        ]
    })
}

pub trait ClassDbExt {
    async fn search_classes(
        &self,
        search: Option<&str>,
        page: PageState,
    ) -> Result<ClassPage, Problem>;

    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, Problem>;

    /// Inserts the class and records it on the owning teacher's class list.
    async fn create_class(&self, data: ClassCreateData, owner: Uuid) -> Result<Class, Problem>;

    /// Replaces the whole stored document with the given state.
    async fn save_class(&self, class: &Class) -> Result<(), Problem>;

    async fn delete_class(&self, id: Uuid) -> Result<Option<Class>, Problem>;

    async fn push_application(
        &self,
        class_id: Uuid,
        application: &Application,
    ) -> Result<(), Problem>;

    async fn remove_time_slot(&self, class_id: Uuid, slot_id: Uuid) -> Result<(), Problem>;
}

impl ClassDbExt for Database {
    async fn search_classes(
        &self,
        search: Option<&str>,
        page: PageState,
    ) -> Result<ClassPage, Problem> {
        let filter = search_filter(search);
        let sort_key = class_sort_key(page.sort_by.as_deref());
        let options = FindOptions::builder()
            .skip(page.skip())
            .limit(page.limit())
            .sort(doc! { sort_key: page.direction() })
            .build();

        let mut cursor = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .find(filter.clone(), options)
            .await
            .map_err(Problem::from)?;

        let mut classes: Vec<ClassResponse> = vec![];
        while let Some(class) = cursor.next().await {
            match class {
                Ok(class) => classes.push(class.into()),
                Err(_) => tracing::warn!("Unable to deserialize Class document."),
            }
        }

        let total = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .count_documents(filter, None)
            .await
            .map_err(Problem::from)?;

        Ok(ClassPage {
            classes,
            total,
            total_pages: total.div_ceil(page.page_length as u64),
            current_page: page.page,
        })
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, Problem> {
        self.collection(CLASS_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn create_class(&self, data: ClassCreateData, owner: Uuid) -> Result<Class, Problem> {
        data.validate()?;

        let duplicate = self
            .collection::<Class>(CLASS_COLLECTION_NAME)
            .find_one(
                doc! {
                    "title": &data.title,
                    "category": &data.category,
                    "description": &data.description,
                },
                None,
            )
            .await
            .map_err(Problem::from)?;
        if duplicate.is_some() {
            return Err(problem::duplicate_class());
        }

        let class = data.into_class(owner);

        self.collection::<Class>(CLASS_COLLECTION_NAME)
            .insert_one(&class, None)
            .await
            .map_err(Problem::from)?;

        // Manual back-reference: the owning teacher's my_classes list.
        if let Some(mut teacher) = self.get_user(owner).await? {
            if let Some(profile) = teacher.teacher_profile_mut() {
                if !profile.my_classes.contains(&class.id) {
                    profile.my_classes.push(class.id);
                    self.save_user(&teacher).await?;
                }
            }
        }

        Ok(class)
    }

    async fn save_class(&self, class: &Class) -> Result<(), Problem> {
        self.collection::<Class>(CLASS_COLLECTION_NAME)
            .find_one_and_replace(filter::by_id(class.id), class, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(class.id))?;

        Ok(())
    }

    async fn delete_class(&self, id: Uuid) -> Result<Option<Class>, Problem> {
        let removed: Option<Class> = self
            .collection(CLASS_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)?;

        if let Some(class) = &removed {
            if let Some(mut teacher) = self.get_user(class.owner).await? {
                if let Some(profile) = teacher.teacher_profile_mut() {
                    profile.my_classes.retain(|c| *c != class.id);
                    self.save_user(&teacher).await?;
                }
            }
        }

        Ok(removed)
    }

    async fn push_application(
        &self,
        class_id: Uuid,
        application: &Application,
    ) -> Result<(), Problem> {
        let application = bson::to_bson(application).map_err(|e| {
            tracing::error!("unable to serialize application: {}", e);
            crate::resp::problem::problems::internal("Unable to store application.")
        })?;

        self.collection::<Class>(CLASS_COLLECTION_NAME)
            .update_one(
                filter::by_id(class_id),
                doc! { "$push": { "applications": application } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn remove_time_slot(&self, class_id: Uuid, slot_id: Uuid) -> Result<(), Problem> {
        self.collection::<Class>(CLASS_COLLECTION_NAME)
            .update_one(
                filter::by_id(class_id),
                doc! { "$pull": { "available_slots": { "id": slot_id.to_string() } } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(())
    }
}
