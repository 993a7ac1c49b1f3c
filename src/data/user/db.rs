use chrono::{NaiveDate, Utc};
use mongodb::options::FindOptions;
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::paging::PageState;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::util;

use super::super::filter;
use super::{PasswordHash, Profile, StudentProfile, TeacherProfile, User, USER_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_name(field: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad name.")
            .insert_str("field", field)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn duplicate_user() -> Problem {
        Problem::new_untyped(Status::BadRequest, "User already exists.")
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Bad email or password.")
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterData {
    pub first_name: String,
    pub last_name: String,
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,

    // Student-only fields.
    pub date_of_birth: Option<NaiveDate>,
    pub adult_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Students younger than this must name a responsible adult.
const ADULT_REQUIRED_BELOW: i32 = 16;

impl RegisterData {
    pub fn validate(&self, role: Role) -> Result<(), Problem> {
        if !self.email.contains('@') {
            return Err(problem::bad_email(
                &self.email,
                "Not a valid e-mail address.",
            ));
        }

        if self.first_name.len() < 2 || self.first_name.len() > 30 {
            return Err(problem::bad_name(
                "first_name",
                "First name must be between 2 and 30 characters long.",
            ));
        }

        if self.last_name.is_empty() || self.last_name.len() > 30 {
            return Err(problem::bad_name(
                "last_name",
                "Last name must be between 1 and 30 characters long.",
            ));
        }

        if self.password.len() < 6 {
            return Err(problem::bad_password(
                "Password must be at least 6 characters (bytes) long.",
            ));
        }

        if self.password.len() > 1024 {
            return Err(problem::bad_password(
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }

        if role == Role::Student {
            let date_of_birth = self.date_of_birth.ok_or_else(|| {
                problem::bad_name("date_of_birth", "Please provide your date of birth.")
            })?;

            if util::age_on(date_of_birth, Utc::now().date_naive()) < ADULT_REQUIRED_BELOW {
                let adult = self.adult_name.as_deref().unwrap_or("").trim().to_string();
                if adult.is_empty() {
                    return Err(problem::bad_name(
                        "adult_name",
                        "Adult name is required for students under 16.",
                    ));
                }
                if adult.split_whitespace().count() < 2 {
                    return Err(problem::bad_name(
                        "adult_name",
                        "Adult name should contain both first name and last name.",
                    ));
                }
            }
        }

        Ok(())
    }

    fn into_profile(self, role: Role) -> Profile {
        match role {
            Role::Student => {
                let date_of_birth = self
                    .date_of_birth
                    .expect("validate() rejects students without a date of birth");
                let underage =
                    util::age_on(date_of_birth, Utc::now().date_naive()) < ADULT_REQUIRED_BELOW;

                Profile::Student(StudentProfile {
                    date_of_birth,
                    adult_name: if underage { self.adult_name } else { None },
                    phone_number: self.phone_number.unwrap_or_default(),
                    my_teachers: vec![],
                    my_lessons: vec![],
                })
            }
            Role::Teacher => Profile::Teacher(TeacherProfile::default()),
            Role::Admin => Profile::Admin,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl UserLoginData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') || self.password.len() < 6 || self.password.len() > 1024 {
            return Err(problem::bad_login());
        }

        Ok(())
    }
}

/// Partial account update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UserUpdateData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub adult_name: Option<String>,
    pub education: Option<String>,
    pub experience: Option<String>,
    pub profile_video: Option<super::MediaRef>,
    pub portfolio_images: Option<Vec<super::MediaRef>>,
}

impl UserUpdateData {
    pub fn apply_to(self, user: &mut User) {
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }

        if let Some(student) = user.student_profile_mut() {
            if let Some(phone_number) = self.phone_number {
                student.phone_number = phone_number;
            }
            if let Some(adult_name) = self.adult_name {
                student.adult_name = Some(adult_name);
            }
        } else if let Some(teacher) = user.teacher_profile_mut() {
            if let Some(education) = self.education {
                teacher.education = education;
            }
            if let Some(experience) = self.experience {
                teacher.experience = experience;
            }
            if let Some(profile_video) = self.profile_video {
                teacher.profile_video = Some(profile_video);
            }
            if let Some(portfolio_images) = self.portfolio_images {
                teacher.portfolio_images = portfolio_images;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPage {
    pub results: Vec<UserResponse>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
}

fn user_sort_key(requested: Option<&str>) -> &'static str {
    match requested {
        Some("last_name") => "last_name",
        Some("email") => "email",
        _ => "first_name",
    }
}

pub trait UserDbExt {
    async fn create_user(
        &self,
        data: RegisterData,
        role: Role,
        admin_emails: impl AsRef<[String]>,
    ) -> Result<(UserRoleToken, User), Problem>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem>;
    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem>;
    async fn find_user_by_reset_token(
        &self,
        token: impl AsRef<str>,
    ) -> Result<Option<User>, Problem>;

    async fn list_users(&self, page: PageState) -> Result<UserPage, Problem>;

    /// Replaces the whole stored document with the given state.
    async fn save_user(&self, user: &User) -> Result<(), Problem>;
    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem>;
}

impl UserDbExt for Database {
    async fn create_user(
        &self,
        data: RegisterData,
        role: Role,
        admin_emails: impl AsRef<[String]>,
    ) -> Result<(UserRoleToken, User), Problem> {
        data.validate(role)?;

        if self.find_user_by_email(&data.email).await?.is_some() {
            return Err(problem::duplicate_user());
        }

        let role = if admin_emails.as_ref().contains(&data.email) {
            Role::Admin
        } else {
            role
        };

        let user = User::new(
            data.first_name.clone(),
            data.last_name.clone(),
            data.email.clone(),
            data.password.clone(),
            data.into_profile(role),
        );

        let urt = UserRoleToken::new(&user);

        self.collection::<User>(USER_COLLECTION_NAME)
            .insert_one(&user, None)
            .await
            .map_err(Problem::from)?;

        Ok((urt, user))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_email(email.as_ref()), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_reset_token(
        &self,
        token: impl AsRef<str>,
    ) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(bson::doc! { "reset_token.token": token.as_ref() }, None)
            .await
            .map_err(Problem::from)
    }

    async fn list_users(&self, page: PageState) -> Result<UserPage, Problem> {
        let sort_key = user_sort_key(page.sort_by.as_deref());
        let options = FindOptions::builder()
            .skip(page.skip())
            .limit(page.limit())
            .sort(bson::doc! { sort_key: page.direction() })
            .build();

        let mut cursor = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find(None, options)
            .await
            .map_err(Problem::from)?;

        let mut results: Vec<UserResponse> = vec![];
        while let Some(user) = cursor.next().await {
            match user {
                Ok(user) => results.push(user.into()),
                Err(_) => tracing::warn!("Unable to deserialize User document."),
            }
        }

        let total = self
            .collection::<User>(USER_COLLECTION_NAME)
            .count_documents(None, None)
            .await
            .map_err(Problem::from)?;

        Ok(UserPage {
            results,
            total,
            total_pages: total.div_ceil(page.page_length as u64),
            current_page: page.page,
        })
    }

    async fn save_user(&self, user: &User) -> Result<(), Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_replace(filter::by_id(user.id), user, None)
            .await
            .map_err(Problem::from)?
            .ok_or_else(|| problem::not_found(user.id))?;

        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn student_data(adult_name: Option<&str>, birth_year: i32) -> RegisterData {
        RegisterData {
            first_name: "Mia".to_string(),
            last_name: "Park".to_string(),
            email: "mia@example.com".to_string(),
            password: "s3cret_pw".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(birth_year, 1, 10),
            adult_name: adult_name.map(str::to_string),
            phone_number: None,
        }
    }

    #[test]
    fn underage_student_requires_adult_name() {
        let current_year = Utc::now().date_naive().year_ce().1 as i32;

        let young = student_data(None, current_year - 10);
        assert!(young.validate(Role::Student).is_err());

        let whitespace_only = student_data(Some("   "), current_year - 10);
        assert!(whitespace_only.validate(Role::Student).is_err());

        let single_word = student_data(Some("Grandma"), current_year - 10);
        assert!(single_word.validate(Role::Student).is_err());

        let full_name = student_data(Some("Hana Park"), current_year - 10);
        assert!(full_name.validate(Role::Student).is_ok());

        let adult_student = student_data(None, current_year - 30);
        assert!(adult_student.validate(Role::Student).is_ok());
    }

    #[test]
    fn adult_name_dropped_for_adult_students() {
        let current_year = Utc::now().date_naive().year_ce().1 as i32;

        let data = student_data(Some("Hana Park"), current_year - 30);
        match data.into_profile(Role::Student) {
            Profile::Student(profile) => assert_eq!(profile.adult_name, None),
            other => panic!("expected a student profile, got {:?}", other),
        }
    }

    #[test]
    fn teacher_registration_skips_student_fields() {
        let data = RegisterData {
            first_name: "Ana".to_string(),
            last_name: "Lovric".to_string(),
            email: "ana@example.com".to_string(),
            password: "s3cret_pw".to_string(),
            date_of_birth: None,
            adult_name: None,
            phone_number: None,
        };

        assert!(data.validate(Role::Teacher).is_ok());
        match data.into_profile(Role::Teacher) {
            Profile::Teacher(profile) => assert!(profile.my_students.is_empty()),
            other => panic!("expected a teacher profile, got {:?}", other),
        }
    }

    #[test]
    fn update_only_touches_present_fields() {
        let mut user = User::new(
            "Ana",
            "Lovric",
            "ana@example.com",
            "s3cret_pw",
            Profile::Teacher(TeacherProfile::default()),
        );

        UserUpdateData {
            education: Some("MSc Mathematics".to_string()),
            ..Default::default()
        }
        .apply_to(&mut user);

        assert_eq!(user.first_name, "Ana");
        assert_eq!(user.teacher_profile().unwrap().education, "MSc Mathematics");
        assert_eq!(user.teacher_profile().unwrap().experience, "");
    }
}
