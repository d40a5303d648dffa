use serde::Deserialize;
use validator::Validate;

use crate::{
    errors::AppError,
    models::{parse_local_time, AdminProfileUpdate, GroupInput, ProfileUpdate},
};

pub const GRADES: [&str; 4] = ["Freshman", "Sophomore", "Junior", "Senior"];

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn grade(value: String) -> Result<Option<String>, AppError> {
    match non_empty(value) {
        Some(grade) if !GRADES.contains(&grade.as_str()) => {
            Err(AppError::custom_bad_request("Unknown grade."))
        }
        grade => Ok(grade),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(default)]
    #[validate(length(max = 64, message = "Names are at most 64 characters long."))]
    pub name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub about_me: String,
}

impl ProfileForm {
    pub fn into_update(self) -> Result<ProfileUpdate, AppError> {
        Ok(ProfileUpdate {
            name: non_empty(self.name),
            grade: grade(self.grade)?,
            about_me: non_empty(self.about_me),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminProfileForm {
    #[validate(email(message = "Invalid email address."), length(min = 1, max = 64))]
    pub email: String,
    #[validate(length(min = 1, max = 64, message = "Usernames are 1 to 64 characters long."))]
    pub username: String,
    pub confirmed: Option<String>,
    pub role: i64,
    #[serde(default)]
    #[validate(length(max = 64, message = "Names are at most 64 characters long."))]
    pub name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub about_me: String,
}

impl AdminProfileForm {
    pub fn into_update(self) -> Result<AdminProfileUpdate, AppError> {
        Ok(AdminProfileUpdate {
            email: self.email.trim().to_owned(),
            username: self.username.trim().to_owned(),
            confirmed: self.confirmed.is_some(),
            role_pk: self.role,
            profile: ProfileUpdate {
                name: non_empty(self.name),
                grade: grade(self.grade)?,
                about_me: non_empty(self.about_me),
            },
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GroupForm {
    #[validate(length(min = 1, message = "Start time is required."))]
    pub start_time: String,
    #[validate(length(min = 1, max = 128, message = "Start place is required."))]
    pub start_place: String,
    #[validate(length(min = 1, max = 128, message = "End place is required."))]
    pub end_place: String,
    #[validate(range(min = 1, max = 64, message = "Expected people must be between 1 and 64."))]
    pub people_amount: i64,
    #[validate(length(min = 1, message = "Description is required."))]
    pub description: String,
}

impl GroupForm {
    /// Converts the start time typed in `utc_offset_hours` to UTC.
    pub fn into_input(self, utc_offset_hours: i32) -> Result<GroupInput, AppError> {
        Ok(GroupInput {
            start_time: parse_local_time(&self.start_time, utc_offset_hours)?,
            start_place: self.start_place.trim().to_owned(),
            end_place: self.end_place.trim().to_owned(),
            people_amount: self.people_amount,
            description: self.description,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentForm {
    #[validate(length(min = 1, message = "Comments cannot be empty."))]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_form_drops_empty_values() {
        let update = ProfileForm {
            name: "  ".into(),
            grade: "Junior".into(),
            about_me: String::new(),
        }
        .into_update()
        .unwrap();
        assert_eq!(update.name, None);
        assert_eq!(update.grade.as_deref(), Some("Junior"));
        assert_eq!(update.about_me, None);
    }

    #[test]
    fn test_profile_form_rejects_unknown_grade() {
        let form = ProfileForm {
            name: "John".into(),
            grade: "Kindergarten".into(),
            about_me: String::new(),
        };
        assert!(form.into_update().is_err());
    }

    #[test]
    fn test_group_form_validation() {
        let form = GroupForm {
            start_time: "2024-05-01 08:30".into(),
            start_place: "Campus".into(),
            end_place: "Airport".into(),
            people_amount: 0,
            description: "Sharing a taxi".into(),
        };
        assert!(form.validate().is_err());

        let form = GroupForm {
            people_amount: 3,
            ..form
        };
        assert!(form.validate().is_ok());
        let input = form.into_input(8).unwrap();
        assert_eq!(input.start_time.to_string(), "2024-05-01 00:30:00");
    }

    #[test]
    fn test_group_form_rejects_bad_start_time() {
        let form = GroupForm {
            start_time: "next monday".into(),
            start_place: "Campus".into(),
            end_place: "Airport".into(),
            people_amount: 3,
            description: "Sharing a taxi".into(),
        };
        assert!(matches!(form.into_input(8), Err(AppError::InvalidStartTime)));
    }
}
