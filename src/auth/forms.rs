use serde::Deserialize;
use validator::Validate;

use crate::{errors::AppError, models::RoleName};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email address."), length(min = 1, max = 64))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    pub remember_me: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(email(message = "Invalid email address."), length(min = 1, max = 64))]
    pub email: String,
    #[validate(length(min = 1, max = 64, message = "Usernames are 1 to 64 characters long."))]
    pub username: String,
    pub role: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    pub password2: String,
}

impl RegisterForm {
    pub fn role(&self) -> Result<RoleName, AppError> {
        self.role.parse()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordForm {
    #[validate(length(min = 1, message = "Old password is required."))]
    pub old_password: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequestForm {
    #[validate(email(message = "Invalid email address."), length(min = 1, max = 64))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[validate(email(message = "Invalid email address."), length(min = 1, max = 64))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl NextQuery {
    /// Only same-site paths are followed after login.
    pub fn redirect_target(&self) -> &str {
        match self.next.as_deref() {
            Some(next) if is_local_path(next) => next,
            _ => "/",
        }
    }
}

/// Browsers read `//host` and `/\host` as another origin and drop tabs and newlines.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.chars().any(|c| c == '\\' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next(value: Option<&str>) -> NextQuery {
        NextQuery {
            next: value.map(String::from),
        }
    }

    #[test]
    fn test_redirect_target_is_relative() {
        assert_eq!(next(None).redirect_target(), "/");
        assert_eq!(next(Some("/carpools")).redirect_target(), "/carpools");
        assert_eq!(next(Some("https://evil.com")).redirect_target(), "/");
        assert_eq!(next(Some("//evil.com")).redirect_target(), "/");
        assert_eq!(next(Some("/\\evil.com")).redirect_target(), "/");
        assert_eq!(next(Some("/\t/evil.com")).redirect_target(), "/");
        assert_eq!(next(Some("/carpool\\..\\evil")).redirect_target(), "/");
        assert_eq!(next(Some("/carpool/3?page=2")).redirect_target(), "/carpool/3?page=2");
    }

    #[test]
    fn test_login_form_validation() {
        let form = LoginForm {
            email: "not an email".into(),
            password: "cat".into(),
            remember_me: None,
        };
        assert!(form.validate().is_err());

        let form = LoginForm {
            email: "john@example.com".into(),
            password: "cat".into(),
            remember_me: Some("on".into()),
        };
        assert!(form.validate().is_ok());
        assert!(form.remember());
    }
}
