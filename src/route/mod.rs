use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod class;
pub mod files;
pub mod lesson;
pub mod notify;
pub mod users;

use class::*;
use files::*;
use lesson::*;
use notify::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        class as cd,
        class::db::{ClassCreateData, ClassPage, ClassResponse, ClassUpdateData, TimeSlotData},
        class::enroll::ApplyOutcome,
        lesson::db::{LessonCreateData, LessonResponse, LessonUpdateData},
        lesson::ScheduleEntry,
        user as ud,
        user::db::{RegisterData, UserLoginData, UserPage, UserResponse, UserUpdateData},
    },
    notify::{Notification, NotificationKind},
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        register_student,
        register_teacher,
        login_submit,
        forgot_password,
        reset_password,
        user_list,
        class_search,
        class_create,
        class_apply,
        class_approve,
        class_reject,
        lesson_list,
        lesson_create
    ),
    components(schemas(
        Role,
        ud::MediaRef,
        ud::Profile,
        ud::StudentProfile,
        ud::TeacherProfile,
        RegisterData,
        UserLoginData,
        UserUpdateData,
        UserResponse,
        UserPage,
        ForgotPasswordData,
        ResetPasswordData,
        cd::LessonType,
        cd::AgeRange,
        cd::TimeSlot,
        cd::Application,
        cd::Enrollment,
        TimeSlotData,
        ClassCreateData,
        ClassUpdateData,
        ClassResponse,
        ClassPage,
        ApplyData,
        ApplyOutcome,
        ScheduleEntry,
        LessonCreateData,
        LessonUpdateData,
        LessonResponse,
        Notification,
        NotificationKind,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        register_student,
        register_teacher,
        login_submit,
        logout,
        forgot_password,
        reset_password,
        user_list,
        user_get,
        user_update,
        user_delete,
        class_search,
        class_get,
        class_create,
        class_update,
        class_delete,
        class_apply,
        class_approve,
        class_reject,
        lesson_list,
        lesson_get,
        lesson_create,
        lesson_update,
        lesson_delete,
        notification_stream,
        media_upload,
        media_delete
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
        .mount("/", routes![app, app_path])
}
