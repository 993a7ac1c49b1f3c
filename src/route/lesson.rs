use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::data::lesson::db::problem as lesson_problem;
use crate::data::lesson::db::{LessonCreateData, LessonDbExt, LessonResponse, LessonUpdateData};
use crate::data::user::db::UserDbExt;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

/// All lessons the authenticated teacher holds with one of their students.
#[utoipa::path(
    responses(
        (status = 200, description = "Lessons with this student", body = Vec<LessonResponse>),
    ),
    security(("jwt" = []))
)]
#[get("/my-students/<student>/lessons")]
#[tracing::instrument(skip(db))]
pub async fn lesson_list(
    student: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<LessonResponse>>, Problem> {
    if !auth.role.can_teach() {
        return Err(problems::forbidden("Only teachers have student lessons."));
    }

    let lessons = db.lessons_for_student(auth.user, student).await?;

    Ok(Json(lessons.into_iter().map(LessonResponse::from).collect()))
}

#[get("/lesson/<id>")]
#[tracing::instrument(skip(db))]
pub async fn lesson_get(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<LessonResponse>, Problem> {
    let lesson = db
        .get_lesson(id)
        .await?
        .ok_or_else(|| lesson_problem::not_found(id))?;

    if lesson.owner != auth.user && lesson.student != auth.user {
        return Err(lesson_problem::not_owner());
    }

    Ok(Json(lesson.into()))
}

/// Schedule an ad-hoc lesson with an enrolled student
#[utoipa::path(
    request_body = LessonCreateData,
    responses(
        (status = 200, description = "Lesson created", body = LessonResponse),
        (status = 400, description = "Duplicate lesson", body = Problem),
        (status = 404, description = "No shared class with this student", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post(
    "/my-students/<student>/lessons",
    format = "application/json",
    data = "<lesson>"
)]
#[tracing::instrument(skip(lesson, db))]
pub async fn lesson_create(
    student: Uuid,
    lesson: Json<LessonCreateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<LessonResponse>, Problem> {
    if !auth.role.can_teach() {
        return Err(problems::forbidden("Only teachers can create lessons."));
    }

    let lesson = db
        .create_lesson(auth.user, student, lesson.into_inner())
        .await?;

    Ok(Json(lesson.into()))
}

#[patch("/lesson/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(update, db, notifier))]
pub async fn lesson_update(
    id: Uuid,
    update: Json<LessonUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<LessonResponse>, Problem> {
    let mut lesson = db
        .get_lesson(id)
        .await?
        .ok_or_else(|| lesson_problem::not_found(id))?;

    if lesson.owner != auth.user {
        return Err(lesson_problem::not_owner());
    }

    update.into_inner().apply_to(&mut lesson);
    db.save_lesson(&lesson).await?;

    let notification = Notification::new(
        lesson.student,
        NotificationKind::LessonUpdated { lesson_id: lesson.id },
        format!("Your lesson '{}' was updated.", lesson.title),
    );
    match db.get_user(lesson.student).await? {
        Some(student) => notifier.push_with_email(notification, &student.email, "Lesson updated"),
        None => notifier.push(notification),
    }

    Ok(Json(lesson.into()))
}

#[delete("/lesson/<id>")]
#[tracing::instrument(skip(db, notifier))]
pub async fn lesson_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<Value>, Problem> {
    let lesson = db
        .get_lesson(id)
        .await?
        .ok_or_else(|| lesson_problem::not_found(id))?;

    if lesson.owner != auth.user {
        return Err(lesson_problem::not_owner());
    }

    db.delete_lesson(&lesson).await?;

    let notification = Notification::new(
        lesson.student,
        NotificationKind::LessonRemoved { lesson_id: lesson.id },
        format!("Your lesson '{}' was cancelled.", lesson.title),
    );
    match db.get_user(lesson.student).await? {
        Some(student) => notifier.push_with_email(notification, &student.email, "Lesson cancelled"),
        None => notifier.push(notification),
    }

    Ok(Json(json!({ "message": "Lesson deleted successfully." })))
}
