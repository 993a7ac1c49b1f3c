use std::io::Cursor;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use crypto::bcrypt::bcrypt;
use rocket::http::ContentType;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde_json::json;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::Role;
use crate::util;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

/// Password reset tokens expire after one hour.
const RESET_TOKEN_VALIDITY_MINUTES: i64 = 60;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash([u8; 24]);

impl PasswordHash {
    pub fn new(password: impl AsRef<str>) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        // bcrypt takes at most 72 input bytes; pre-hashing removes the limit.
        let mut sha = Sha256::new();
        Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(
            12,
            &crate::SECURITY.salt,
            sha.finalize().as_slice(),
            &mut pw_hash,
        );

        PasswordHash(pw_hash)
    }
}

/// Reference into the media store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MediaRef {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentProfile {
    pub date_of_birth: NaiveDate,
    /// Required for students younger than 16.
    #[serde(default)]
    pub adult_name: Option<String>,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub my_teachers: Vec<Uuid>,
    #[serde(default)]
    pub my_lessons: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TeacherProfile {
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub profile_video: Option<MediaRef>,
    #[serde(default)]
    pub portfolio_images: Vec<MediaRef>,
    #[serde(default)]
    pub my_students: Vec<Uuid>,
    #[serde(default)]
    pub my_classes: Vec<Uuid>,
}

/// Role-discriminated profile payload stored inline in the user document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Student(StudentProfile),
    Teacher(TeacherProfile),
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate() -> ResetToken {
        ResetToken {
            token: util::random_token(48),
            expires: Utc::now() + Duration::minutes(RESET_TOKEN_VALIDITY_MINUTES),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires < Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub pw_hash: PasswordHash,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<ResetToken>,
}

impl User {
    pub fn new(
        first_name: impl ToString,
        last_name: impl ToString,
        email: impl ToString,
        password: impl AsRef<str>,
        profile: Profile,
    ) -> User {
        let email = email.to_string();
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes());
        tracing::info!("Creating a new user with UUID: {}", id);

        User {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email,
            pw_hash: PasswordHash::new(password),
            profile,
            reset_token: None,
        }
    }

    pub fn role(&self) -> Role {
        match &self.profile {
            Profile::Student(_) => Role::Student,
            Profile::Teacher(_) => Role::Teacher,
            Profile::Admin => Role::Admin,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn student_profile(&self) -> Option<&StudentProfile> {
        match &self.profile {
            Profile::Student(p) => Some(p),
            _ => None,
        }
    }

    pub fn student_profile_mut(&mut self) -> Option<&mut StudentProfile> {
        match &mut self.profile {
            Profile::Student(p) => Some(p),
            _ => None,
        }
    }

    pub fn teacher_profile(&self) -> Option<&TeacherProfile> {
        match &self.profile {
            Profile::Teacher(p) => Some(p),
            _ => None,
        }
    }

    pub fn teacher_profile_mut(&mut self) -> Option<&mut TeacherProfile> {
        match &mut self.profile {
            Profile::Teacher(p) => Some(p),
            _ => None,
        }
    }

    /// Public view of the account, without credential material.
    pub fn response_json(&self) -> String {
        json!({
            "id": self.id,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "email": self.email,
            "role": self.role(),
        })
        .to_string()
    }
}

impl<'r> Responder<'r, 'static> for User {
    fn respond_to(self, _: &Request) -> response::Result<'static> {
        let body: String = self.response_json();

        Response::build()
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_profile() -> Profile {
        Profile::Student(StudentProfile {
            date_of_birth: NaiveDate::from_ymd_opt(2008, 3, 2).unwrap(),
            adult_name: None,
            phone_number: String::new(),
            my_teachers: vec![],
            my_lessons: vec![],
        })
    }

    #[test]
    fn password_hash_is_deterministic() {
        assert_eq!(PasswordHash::new("s3cret_pw"), PasswordHash::new("s3cret_pw"));
        assert_ne!(PasswordHash::new("s3cret_pw"), PasswordHash::new("other_pw"));
    }

    #[test]
    fn profile_serializes_with_role_tag() {
        let user = User::new("Mia", "Park", "mia@example.com", "s3cret_pw", student_profile());

        let value = serde_json::to_value(&user).expect("user serializes");
        assert_eq!(value["role"], "student");
        assert_eq!(value["date_of_birth"], "2008-03-02");

        let teacher = User::new(
            "Ana",
            "Lovric",
            "ana@example.com",
            "s3cret_pw",
            Profile::Teacher(TeacherProfile::default()),
        );
        let value = serde_json::to_value(&teacher).expect("teacher serializes");
        assert_eq!(value["role"], "teacher");
    }

    #[test]
    fn role_follows_profile_variant() {
        let user = User::new("Mia", "Park", "mia@example.com", "s3cret_pw", student_profile());
        assert_eq!(user.role(), Role::Student);
        assert!(!user.role().can_teach());

        let teacher = User::new(
            "Ana",
            "Lovric",
            "ana@example.com",
            "s3cret_pw",
            Profile::Teacher(TeacherProfile::default()),
        );
        assert_eq!(teacher.role(), Role::Teacher);
        assert!(teacher.role().can_teach());
    }

    #[test]
    fn fresh_reset_token_is_valid() {
        let token = ResetToken::generate();
        assert!(!token.is_expired());
        assert_eq!(token.token.len(), 48);
    }
}
