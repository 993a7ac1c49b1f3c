use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::db::problem as class_problem;
use crate::data::class::db::{
    ClassCreateData, ClassDbExt, ClassPage, ClassResponse, ClassUpdateData,
};
use crate::data::class::enroll::{ApplyOutcome, EnrollmentFlowExt};
use crate::data::lesson::db::LessonResponse;
use crate::middleware::paging::PageState;
use crate::notify::Notifier;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::resp::jwt::UserRoleToken;

/// Search class listings
#[utoipa::path(
    params(
        ("search", description = "Free-text filter on title, category and description")
    ),
    responses(
        (status = 200, description = "One page of matching classes", body = ClassPage),
    )
)]
#[get("/class?<search>")]
#[tracing::instrument(skip(db))]
pub async fn class_search(
    search: Option<&str>,
    page: PageState,
    db: &State<Database>,
) -> Result<Json<ClassPage>, Problem> {
    Ok(Json(db.search_classes(search, page).await?))
}

#[get("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_get(
    id: Uuid,
    db: &State<Database>,
) -> Result<Option<Json<ClassResponse>>, Problem> {
    Ok(db.get_class(id).await?.map(|c| Json(c.into())))
}

/// Create a class listing
#[utoipa::path(request_body = ClassCreateData, security(("jwt" = [])))]
#[post("/class", format = "application/json", data = "<class>")]
#[tracing::instrument(skip(class, db))]
pub async fn class_create(
    class: Json<ClassCreateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<ClassResponse>, Problem> {
    if !auth.role.can_teach() {
        return Err(problems::forbidden("Only teachers can create classes."));
    }

    let class = db.create_class(class.into_inner(), auth.user).await?;

    Ok(Json(class.into()))
}

#[patch("/class/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(update, db))]
pub async fn class_update(
    id: Uuid,
    update: Json<ClassUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<ClassResponse>, Problem> {
    let mut class = db
        .get_class(id)
        .await?
        .ok_or_else(|| class_problem::not_found(id))?;

    if class.owner != auth.user && auth.role < Role::Admin {
        return Err(problems::forbidden("Class not owned by user."));
    }

    update.into_inner().apply_to(&mut class);
    db.save_class(&class).await?;

    Ok(Json(class.into()))
}

#[delete("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Value>, Problem> {
    let class = db
        .get_class(id)
        .await?
        .ok_or_else(|| class_problem::not_found(id))?;

    if class.owner != auth.user && auth.role < Role::Admin {
        return Err(problems::forbidden("Class not owned by user."));
    }

    db.delete_class(id).await?;

    Ok(Json(json!({ "message": "Class deleted successfully." })))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplyData {
    pub slot_id: Uuid,
}

/// Apply for enrollment at one of the class's available time slots
#[utoipa::path(
    request_body = ApplyData,
    responses(
        (status = 200, description = "Application recorded", body = ApplyOutcome),
        (status = 400, description = "Invalid time slot", body = Problem),
        (status = 403, description = "Only students can apply", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
        (status = 409, description = "Duplicate application or full class", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/class/<id>/apply", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data, db, notifier))]
pub async fn class_apply(
    id: Uuid,
    data: Json<ApplyData>,
    auth: UserRoleToken,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<ApplyOutcome>, Problem> {
    let outcome = db
        .apply_to_class(id, &auth, data.slot_id, notifier)
        .await?;

    Ok(Json(outcome))
}

/// Approve a pending application, enrolling the student
#[utoipa::path(
    responses(
        (status = 200, description = "Student enrolled; first lesson created", body = LessonResponse),
        (status = 403, description = "Class not owned by user", body = Problem),
        (status = 404, description = "Class or application doesn't exist", body = Problem),
        (status = 409, description = "Student already enrolled", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/class/<id>/applications/<application_id>/approve")]
#[tracing::instrument(skip(db, notifier))]
pub async fn class_approve(
    id: Uuid,
    application_id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<LessonResponse>, Problem> {
    let lesson = db
        .approve_application(id, application_id, &auth, notifier)
        .await?;

    Ok(Json(lesson.into()))
}

/// Reject a pending application
#[utoipa::path(
    responses(
        (status = 200, description = "Application discarded"),
        (status = 403, description = "Class not owned by user", body = Problem),
        (status = 404, description = "Class or application doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/class/<id>/applications/<application_id>/reject")]
#[tracing::instrument(skip(db, notifier))]
pub async fn class_reject(
    id: Uuid,
    application_id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<Value>, Problem> {
    db.reject_application(id, application_id, &auth, notifier)
        .await?;

    Ok(Json(json!({ "message": "Application rejected." })))
}
