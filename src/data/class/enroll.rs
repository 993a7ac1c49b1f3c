//! Class application and approval workflow.
//!
//! The approve path is a 4-way multi-document mutation (class, teacher,
//! student, lesson) issued as sequential writes with no cross-document
//! transaction. A crash mid-sequence leaves partial state behind; the class
//! document is persisted last so a retried approve finds the application
//! gone and becomes a safe no-op (first approve wins).

use chrono::Utc;
use mongodb::Database;
use rocket::http::Status;
use thiserror::Error;
use uuid::Uuid;

use crate::data::class::db::ClassDbExt;
use crate::data::lesson::db::LessonDbExt;
use crate::data::lesson::Lesson;
use crate::data::user::db::UserDbExt;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::role::Role;

use super::{Application, Class, Enrollment, LessonType};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum EnrollError {
    #[error("Only students can apply to classes.")]
    NotStudent,
    #[error("Class doesn't exist.")]
    ClassNotFound,
    #[error("You have already applied to this class.")]
    AlreadyApplied,
    #[error("Student is already enrolled in this class.")]
    AlreadyEnrolled,
    #[error("This one-on-one class already has an applicant.")]
    ClassTaken,
    #[error("Invalid time slot.")]
    InvalidTimeSlot,
    #[error("Application doesn't exist.")]
    ApplicationNotFound,
    #[error("Class not owned by user.")]
    NotOwner,
}

impl From<EnrollError> for Problem {
    fn from(e: EnrollError) -> Self {
        let status = match e {
            EnrollError::NotStudent | EnrollError::NotOwner => Status::Forbidden,
            EnrollError::ClassNotFound | EnrollError::ApplicationNotFound => Status::NotFound,
            EnrollError::AlreadyApplied
            | EnrollError::AlreadyEnrolled
            | EnrollError::ClassTaken => Status::Conflict,
            EnrollError::InvalidTimeSlot => Status::BadRequest,
        };

        Problem::new_untyped(status, e)
    }
}

impl Class {
    /// Records a new application, enforcing the invariant that an applicant
    /// appears in at most one of {applications, enrolled}. For OneOnOne
    /// classes the claimed slot is removed immediately (early lock).
    pub fn record_application(
        &mut self,
        applicant: Uuid,
        slot_id: Uuid,
    ) -> Result<Application, EnrollError> {
        if self.has_applicant(applicant) {
            return Err(EnrollError::AlreadyApplied);
        }
        if self.is_enrolled(applicant) {
            return Err(EnrollError::AlreadyEnrolled);
        }
        if self.lesson_type == LessonType::OneOnOne && !self.applications.is_empty() {
            return Err(EnrollError::ClassTaken);
        }

        let slot = self.slot(slot_id).ok_or(EnrollError::InvalidTimeSlot)?;

        let application = Application {
            id: Uuid::new_v4(),
            applicant,
            date: slot.date,
            start_time: slot.start_time.clone(),
            applied_at: Utc::now(),
        };

        self.applications.push(application.clone());

        if self.lesson_type == LessonType::OneOnOne {
            self.available_slots.retain(|s| s.id != slot_id);
        }

        Ok(application)
    }

    /// Moves a pending application into the enrolled set and returns it.
    pub fn take_application(&mut self, application_id: Uuid) -> Result<Application, EnrollError> {
        let index = self
            .applications
            .iter()
            .position(|a| a.id == application_id)
            .ok_or(EnrollError::ApplicationNotFound)?;

        if self.is_enrolled(self.applications[index].applicant) {
            return Err(EnrollError::AlreadyEnrolled);
        }

        let application = self.applications.remove(index);
        self.enrolled.push(Enrollment {
            student: application.applicant,
            enrolled_at: Utc::now(),
        });

        Ok(application)
    }

    /// Discards a pending application. Re-applying afterwards is allowed.
    pub fn discard_application(
        &mut self,
        application_id: Uuid,
    ) -> Result<Application, EnrollError> {
        let index = self
            .applications
            .iter()
            .position(|a| a.id == application_id)
            .ok_or(EnrollError::ApplicationNotFound)?;

        Ok(self.applications.remove(index))
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApplyOutcome {
    pub message: String,
    pub application_id: Uuid,
}

pub trait EnrollmentFlowExt {
    async fn apply_to_class(
        &self,
        class_id: Uuid,
        applicant: &UserRoleToken,
        slot_id: Uuid,
        notifier: &Notifier,
    ) -> Result<ApplyOutcome, Problem>;

    async fn approve_application(
        &self,
        class_id: Uuid,
        application_id: Uuid,
        approver: &UserRoleToken,
        notifier: &Notifier,
    ) -> Result<Lesson, Problem>;

    async fn reject_application(
        &self,
        class_id: Uuid,
        application_id: Uuid,
        approver: &UserRoleToken,
        notifier: &Notifier,
    ) -> Result<(), Problem>;
}

fn owned_class(class: Option<Class>, approver: &UserRoleToken) -> Result<Class, EnrollError> {
    let class = class.ok_or(EnrollError::ClassNotFound)?;
    if class.owner != approver.user {
        return Err(EnrollError::NotOwner);
    }
    Ok(class)
}

impl EnrollmentFlowExt for Database {
    async fn apply_to_class(
        &self,
        class_id: Uuid,
        applicant: &UserRoleToken,
        slot_id: Uuid,
        notifier: &Notifier,
    ) -> Result<ApplyOutcome, Problem> {
        if applicant.role != Role::Student {
            return Err(EnrollError::NotStudent.into());
        }

        let mut class = self
            .get_class(class_id)
            .await?
            .ok_or(EnrollError::ClassNotFound)?;

        let lesson_type = class.lesson_type;
        let application = class.record_application(applicant.user, slot_id)?;

        self.push_application(class_id, &application).await?;

        // Early lock: the claimed slot is released as a separate write, not
        // atomic with the application push.
        if lesson_type == LessonType::OneOnOne {
            self.remove_time_slot(class_id, slot_id).await?;
        }

        notifier.push(Notification::new(
            class.owner,
            NotificationKind::ApplicationReceived {
                class_id,
                applicant: applicant.user,
            },
            format!("New application for your class \"{}\".", class.title),
        ));

        let message = match lesson_type {
            LessonType::OneOnOne => {
                "Applied successfully. The time slot is reserved for you until the teacher decides."
            }
            LessonType::Group => "Applied successfully. The teacher will review your application.",
        };

        Ok(ApplyOutcome {
            message: message.to_string(),
            application_id: application.id,
        })
    }

    async fn approve_application(
        &self,
        class_id: Uuid,
        application_id: Uuid,
        approver: &UserRoleToken,
        notifier: &Notifier,
    ) -> Result<Lesson, Problem> {
        let class = self.get_class(class_id).await?;
        let mut class = owned_class(class, approver)?;

        let application = class.take_application(application_id)?;

        let mut teacher = self
            .get_user(class.owner)
            .await?
            .ok_or_else(|| crate::data::user::db::problem::not_found(class.owner))?;
        if let Some(profile) = teacher.teacher_profile_mut() {
            if !profile.my_students.contains(&application.applicant) {
                profile.my_students.push(application.applicant);
            }
        }
        self.save_user(&teacher).await?;

        let lesson = Lesson::from_approval(&class, &application);
        self.insert_lesson(&lesson).await?;

        let mut student = self
            .get_user(application.applicant)
            .await?
            .ok_or_else(|| crate::data::user::db::problem::not_found(application.applicant))?;
        if let Some(profile) = student.student_profile_mut() {
            if !profile.my_lessons.contains(&lesson.id) {
                profile.my_lessons.push(lesson.id);
            }
            if !profile.my_teachers.contains(&class.owner) {
                profile.my_teachers.push(class.owner);
            }
        }
        self.save_user(&student).await?;

        // Persisted last: once the application is gone from the stored class,
        // a duplicate approve resolves to ApplicationNotFound.
        self.save_class(&class).await?;

        notifier.push_with_email(
            Notification::new(
                application.applicant,
                NotificationKind::ApplicationApproved {
                    class_id,
                    lesson_id: lesson.id,
                },
                format!(
                    "Your application for \"{}\" was approved. Your first lesson is scheduled.",
                    class.title
                ),
            ),
            &student.email,
            format!("Enrolled: {}", class.title),
        );

        Ok(lesson)
    }

    async fn reject_application(
        &self,
        class_id: Uuid,
        application_id: Uuid,
        approver: &UserRoleToken,
        notifier: &Notifier,
    ) -> Result<(), Problem> {
        let class = self.get_class(class_id).await?;
        let mut class = owned_class(class, approver)?;

        let application = class.discard_application(application_id)?;
        self.save_class(&class).await?;

        notifier.push(Notification::new(
            application.applicant,
            NotificationKind::ApplicationRejected { class_id },
            format!("Your application for \"{}\" was rejected.", class.title),
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class::{AgeRange, TimeSlot};
    use crate::data::user::{Profile, TeacherProfile, User};
    use chrono::NaiveDate;

    fn slot(day: u32) -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 9, day).unwrap(),
            start_time: "16:00".to_string(),
        }
    }

    fn class(lesson_type: LessonType, slots: Vec<TimeSlot>) -> Class {
        Class {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            title: "Beginner violin".to_string(),
            category: "Music".to_string(),
            description: "First steps on the violin.".to_string(),
            price: 25.0,
            duration: 45,
            ages: AgeRange { min: 6, max: 99 },
            lesson_type,
            goal: None,
            experience: None,
            other: None,
            available_slots: slots,
            applications: vec![],
            enrolled: vec![],
            image: None,
        }
    }

    /// An applicant id may appear in at most one of {applications, enrolled}.
    fn assert_applicant_invariant(class: &Class) {
        for application in &class.applications {
            assert!(
                !class.is_enrolled(application.applicant),
                "applicant {} present in both applications and enrolled",
                application.applicant
            );
        }
    }

    #[test]
    fn applying_twice_conflicts_and_keeps_one_entry() {
        let s = slot(1);
        let mut class = class(LessonType::Group, vec![s.clone(), slot(2)]);
        let student = Uuid::new_v4();

        class.record_application(student, s.id).expect("first apply works");
        let second = class.record_application(student, s.id);

        assert_eq!(second, Err(EnrollError::AlreadyApplied));
        assert_eq!(class.applications.len(), 1);
        assert_applicant_invariant(&class);
    }

    #[test]
    fn one_on_one_locks_slot_and_rejects_second_applicant() {
        let s1 = slot(1);
        let mut class = class(LessonType::OneOnOne, vec![s1.clone(), slot(2)]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let application = class.record_application(a, s1.id).expect("first apply works");
        assert_eq!(application.date, s1.date);
        assert_eq!(application.start_time, s1.start_time);

        // Claimed slot is gone immediately, before any approval.
        assert!(class.slot(s1.id).is_none());
        assert_eq!(class.available_slots.len(), 1);

        let second = class.record_application(b, class.available_slots[0].id);
        assert_eq!(second, Err(EnrollError::ClassTaken));
        assert_eq!(class.applications.len(), 1);
    }

    #[test]
    fn group_class_keeps_slots_and_accepts_more_applicants() {
        let s1 = slot(1);
        let mut class = class(LessonType::Group, vec![s1.clone()]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        class.record_application(a, s1.id).expect("first apply works");
        class.record_application(b, s1.id).expect("second applicant fits");

        assert!(class.slot(s1.id).is_some());
        assert_eq!(class.applications.len(), 2);
        assert_applicant_invariant(&class);
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let mut class = class(LessonType::Group, vec![slot(1)]);

        let result = class.record_application(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(result, Err(EnrollError::InvalidTimeSlot));
        assert!(class.applications.is_empty());
    }

    #[test]
    fn take_application_enrolls_exactly_once() {
        let s = slot(1);
        let mut class = class(LessonType::OneOnOne, vec![s.clone()]);
        let student = Uuid::new_v4();

        let application = class.record_application(student, s.id).expect("apply works");
        let app_id = application.id;

        let taken = class.take_application(app_id).expect("pending application moves");
        assert_eq!(taken.applicant, student);
        assert!(class.applications.is_empty());
        assert_eq!(class.enrolled.len(), 1);
        assert_eq!(class.enrolled[0].student, student);
        assert_applicant_invariant(&class);

        // Retried approve: the entry is gone, so this is a safe no-op.
        assert_eq!(
            class.take_application(app_id),
            Err(EnrollError::ApplicationNotFound)
        );
        assert_eq!(class.enrolled.len(), 1);
    }

    #[test]
    fn enrolled_student_cannot_reapply() {
        let s1 = slot(1);
        let s2 = slot(2);
        let mut class = class(LessonType::Group, vec![s1.clone(), s2.clone()]);
        let student = Uuid::new_v4();

        let application = class.record_application(student, s1.id).expect("apply works");
        class.take_application(application.id).expect("approve works");

        let again = class.record_application(student, s2.id);
        assert_eq!(again, Err(EnrollError::AlreadyEnrolled));
        assert_applicant_invariant(&class);
    }

    #[test]
    fn reject_removes_only_the_named_application() {
        let s = slot(1);
        let mut class = class(LessonType::Group, vec![s.clone()]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let app_a = class.record_application(a, s.id).expect("a applies");
        let app_b = class.record_application(b, s.id).expect("b applies");

        let discarded = class.discard_application(app_a.id).expect("reject works");
        assert_eq!(discarded.applicant, a);

        assert_eq!(class.applications.len(), 1);
        assert_eq!(class.applications[0].id, app_b.id);
        assert!(class.enrolled.is_empty());

        // Rejection is not a block: the entry is gone, reapplying works.
        assert!(class.record_application(a, s.id).is_ok());
    }

    #[test]
    fn approval_lesson_copies_class_and_slot_data() {
        let s = slot(1);
        let mut class = class(LessonType::OneOnOne, vec![s.clone()]);
        let student = Uuid::new_v4();

        let application = class.record_application(student, s.id).expect("apply works");
        let taken = class.take_application(application.id).expect("approve works");
        let lesson = Lesson::from_approval(&class, &taken);

        assert_eq!(lesson.owner, class.owner);
        assert_eq!(lesson.student, student);
        assert_eq!(lesson.class_id, Some(class.id));
        assert_eq!(lesson.title, class.title);
        assert_eq!(lesson.schedule.len(), 1);
        assert_eq!(lesson.schedule[0].date, s.date);
        assert_eq!(lesson.schedule[0].start_time, s.start_time);
    }

    #[test]
    fn approve_and_reject_are_gated_on_class_ownership() {
        let s = slot(1);
        let mut class = class(LessonType::Group, vec![s.clone()]);
        let application = class
            .record_application(Uuid::new_v4(), s.id)
            .expect("apply works");

        let outsider = User::new(
            "Ivo",
            "Horvat",
            "ivo@example.com",
            "s3cret_pw",
            Profile::Teacher(TeacherProfile::default()),
        );
        let token = UserRoleToken::new(&outsider);

        assert_eq!(
            owned_class(Some(class.clone()), &token).err(),
            Some(EnrollError::NotOwner)
        );
        assert_eq!(
            owned_class(None, &token).err(),
            Some(EnrollError::ClassNotFound)
        );

        // The pending application is untouched by the failed check.
        assert_eq!(class.applications.len(), 1);
        assert_eq!(class.application(application.id), Some(&application));
        assert!(class.enrolled.is_empty());
    }

    #[test]
    fn enroll_errors_map_to_the_documented_statuses() {
        use rocket::http::Status;

        let cases = [
            (EnrollError::NotStudent, Status::Forbidden),
            (EnrollError::NotOwner, Status::Forbidden),
            (EnrollError::ClassNotFound, Status::NotFound),
            (EnrollError::ApplicationNotFound, Status::NotFound),
            (EnrollError::AlreadyApplied, Status::Conflict),
            (EnrollError::AlreadyEnrolled, Status::Conflict),
            (EnrollError::ClassTaken, Status::Conflict),
            (EnrollError::InvalidTimeSlot, Status::BadRequest),
        ];

        for (error, status) in cases {
            assert_eq!(Problem::from(error).status, status, "{:?}", error);
        }
    }
}
