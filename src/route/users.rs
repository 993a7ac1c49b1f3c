use mongodb::Database;
use rocket::http::{Cookie, CookieJar};
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{
    RegisterData, UserDbExt, UserLoginData, UserPage, UserResponse, UserUpdateData,
};
use crate::data::user::{PasswordHash, ResetToken, User};
use crate::middleware::paging::PageState;
use crate::notify::Notifier;
use crate::resp::jwt::{UserRoleToken, AUTH_COOKIE_NAME};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

async fn register<'a>(
    data: RegisterData,
    role: Role,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    c: &State<Config>,
) -> Result<Json<UserResponse>, Problem> {
    let (token, user) = db.create_user(data, role, &c.admin_emails).await?;
    cookies.add(token.cookie()?);

    Ok(Json(UserResponse::from(user)))
}

/// Register a student account
#[utoipa::path(request_body = RegisterData)]
#[post("/register/student", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data, cookies, db, c))]
pub async fn register_student<'a>(
    data: Json<RegisterData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    c: &State<Config>,
) -> Result<Json<UserResponse>, Problem> {
    register(data.into_inner(), Role::Student, cookies, db, c).await
}

/// Register a teacher account
#[utoipa::path(request_body = RegisterData)]
#[post("/register/teacher", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data, cookies, db, c))]
pub async fn register_teacher<'a>(
    data: Json<RegisterData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    c: &State<Config>,
) -> Result<Json<UserResponse>, Problem> {
    register(data.into_inner(), Role::Teacher, cookies, db, c).await
}

/// Log in with email and password
#[utoipa::path(request_body = UserLoginData)]
#[post("/login", format = "application/json", data = "<login_user>")]
#[tracing::instrument(skip(login_user, cookies, db))]
pub async fn login_submit<'a>(
    login_user: Json<UserLoginData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
) -> Result<User, Problem> {
    let login_user = login_user.into_inner();
    login_user.validate()?;

    let user = db
        .find_user_by_email(&login_user.email)
        .await?
        .ok_or_else(user_problem::bad_login)?;

    if user.pw_hash != PasswordHash::new(&login_user.password) {
        return Err(user_problem::bad_login());
    }

    let urt = UserRoleToken::new(&user);
    cookies.add(urt.cookie()?);

    Ok(user)
}

#[post("/logout")]
#[tracing::instrument(skip(cookies))]
pub async fn logout(cookies: &CookieJar<'_>) -> Json<Value> {
    cookies.remove(Cookie::from(AUTH_COOKIE_NAME));

    Json(json!({ "message": "Logged out." }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordData {
    #[schema(format = "email")]
    pub email: String,
}

/// Request a password reset link
#[utoipa::path(request_body = ForgotPasswordData)]
#[post("/forgot-password", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data, db, c, notifier))]
pub async fn forgot_password(
    data: Json<ForgotPasswordData>,
    db: &State<Database>,
    c: &State<Config>,
    notifier: &State<Notifier>,
) -> Result<Json<Value>, Problem> {
    let mut user = db
        .find_user_by_email(&data.email)
        .await?
        .ok_or_else(|| problems::not_found("User doesn't exist."))?;

    let reset = ResetToken::generate();
    let reset_url = format!("{}/reset-password?token={}", c.app_url, reset.token);
    user.reset_token = Some(reset);
    db.save_user(&user).await?;

    notifier.email(
        &user.email,
        "Password reset token",
        format!(
            "You are receiving this email because you (or someone else) have requested \
             the reset of a password. Please make a put request to:\n\n{}",
            reset_url
        ),
    );

    Ok(Json(json!({ "message": "Email sent." })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordData {
    pub token: String,
    #[schema(format = "password")]
    pub new_password: String,
}

/// Reset a password using an emailed token
#[utoipa::path(request_body = ResetPasswordData)]
#[post("/reset-password", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data, db))]
pub async fn reset_password(
    data: Json<ResetPasswordData>,
    db: &State<Database>,
) -> Result<Json<Value>, Problem> {
    let data = data.into_inner();

    if data.token.is_empty() || data.new_password.len() < 6 {
        return Err(problems::bad_request("Invalid request."));
    }

    let mut user = db
        .find_user_by_reset_token(&data.token)
        .await?
        .ok_or_else(|| problems::bad_request("Invalid or expired token."))?;

    let expired = user
        .reset_token
        .as_ref()
        .map(ResetToken::is_expired)
        .unwrap_or(true);
    if expired {
        return Err(problems::bad_request("Invalid or expired token."));
    }

    user.pw_hash = PasswordHash::new(&data.new_password);
    user.reset_token = None;
    db.save_user(&user).await?;

    Ok(Json(json!({ "message": "Password reset successful." })))
}

/// List accounts, paginated and sorted
#[utoipa::path(
    responses(
        (status = 200, description = "One page of accounts", body = UserPage),
        (status = 401, description = "Missing or expired token", body = Problem),
        (status = 403, description = "Caller isn't an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user")]
#[tracing::instrument(skip(db))]
pub async fn user_list(
    auth: UserRoleToken,
    page: PageState,
    db: &State<Database>,
) -> Result<Json<UserPage>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden(
            "Only admin can get a list of all users.",
        ));
    }

    let result = db.list_users(page).await?;
    if result.results.is_empty() {
        return Err(problems::not_found("No results found."));
    }

    Ok(Json(result))
}

#[get("/user/<id>")]
#[tracing::instrument(skip(db))]
pub async fn user_get(
    id: Uuid,
    _auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Option<User>, Problem> {
    db.get_user(id).await
}

#[patch("/user/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(update, db))]
pub async fn user_update(
    id: Uuid,
    update: Json<UserUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<UserResponse>, Problem> {
    if auth.user != id && auth.role < Role::Admin {
        return Err(problems::forbidden("Accounts can only be edited by their owner."));
    }

    let mut user = db
        .get_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;

    update.into_inner().apply_to(&mut user);
    db.save_user(&user).await?;

    Ok(Json(UserResponse::from(user)))
}

#[delete("/user/<id>")]
#[tracing::instrument(skip(cookies, db))]
pub async fn user_delete<'a>(
    id: Uuid,
    auth: UserRoleToken,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
) -> Result<String, Problem> {
    if auth.user != id && auth.role < Role::Admin {
        return Err(problems::forbidden(
            "Accounts can only be deleted by their owner.",
        ));
    }

    let removed = db.delete_user(id).await?;

    if let Some(removed) = removed {
        if auth.user == id {
            cookies.remove(Cookie::from(AUTH_COOKIE_NAME));
        }
        Ok(removed.id.to_string())
    } else {
        Err(user_problem::not_found(id))
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod user_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    use crate::data::user::db::{RegisterData, UserDbExt, UserResponse};
    use crate::resp::jwt::HasAuthCookie;
    use crate::role::Role;
    use mongodb::Database;

    fn example_register_data(user: impl AsRef<str>) -> RegisterData {
        RegisterData {
            first_name: "Test".to_string(),
            last_name: user.as_ref().to_string(),
            email: user.as_ref().to_string() + "@example.com",
            password: user.as_ref().replace('o', "0").replace('e', "3"),
            date_of_birth: None,
            adult_name: None,
            phone_number: None,
        }
    }

    fn register_body(user: impl AsRef<str>) -> String {
        let data = example_register_data(user);
        serde_json::json!({
            "first_name": data.first_name,
            "last_name": data.last_name,
            "email": data.email,
            "password": data.password,
        })
        .to_string()
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn v1_register_teacher_works() {
        let client = Client::tracked(crate::create(None).await.expect("invalid backend"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let response = client
            .post("/api/v1/register/teacher")
            .header(ContentType::JSON)
            .body(register_body("v1_register_teacher_works"))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "an ok response");
        assert!(
            response.get_auth_cookie().is_some(),
            "jwt_auth cookie wasn't present"
        );

        let response_data: UserResponse =
            response.into_json().await.expect("invalid response json");
        assert_eq!(response_data.role, Role::Teacher);

        db.delete_user(response_data.id)
            .await
            .expect("unable to delete test user");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn v1_register_duplicate_email_fails() {
        let client = Client::tracked(crate::create(None).await.expect("invalid backend"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let data = example_register_data("v1_register_duplicate_email_fails");
        let (_, user) = db
            .create_user(data, Role::Teacher, &[])
            .await
            .expect("unable to create test user");

        let response = client
            .post("/api/v1/register/teacher")
            .header(ContentType::JSON)
            .body(register_body("v1_register_duplicate_email_fails"))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::BadRequest, "duplicate rejected");

        db.delete_user(user.id)
            .await
            .expect("unable to delete test user");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn v1_login_submit_works() {
        let client = Client::tracked(crate::create(None).await.expect("invalid backend"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let data = example_register_data("v1_login_submit_works");
        let (_, user) = db
            .create_user(data.clone(), Role::Teacher, &[])
            .await
            .expect("unable to create test user");

        let response = client
            .post("/api/v1/login")
            .header(ContentType::JSON)
            .body(
                serde_json::json!({ "email": data.email, "password": data.password }).to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "an ok response");
        assert!(
            response.get_auth_cookie().is_some(),
            "no jwt_auth cookie present"
        );

        db.delete_user(user.id)
            .await
            .expect("unable to delete test user");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn v1_user_delete_doesnt_work_for_unauthorized_users() {
        let client = Client::tracked(crate::create(None).await.expect("invalid backend"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let data = example_register_data("v1_user_delete_unauthorized");
        let (_, user) = db
            .create_user(data, Role::Teacher, &[])
            .await
            .expect("unable to create user");

        let delete_uri = format!("/api/v1/user/{}", user.id);
        let response = client.delete(&delete_uri).dispatch().await;
        assert_eq!(
            response.status(),
            Status::Unauthorized,
            "expected unauthorized response"
        );

        db.delete_user(user.id)
            .await
            .expect("unable to delete test user");
    }
}
