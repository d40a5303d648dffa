use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[macro_export]
macro_rules! log_and_wrap_custom_internal {
    ($e:expr) => {{
        tracing::error!(error = %$e, "{}:{}", file!(), line!());
        $crate::errors::AppError::custom_internal(&$e.to_string())
    }};
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    DoesNotExist,
    #[error("You are not allowed to do that")]
    Forbidden,
    #[error("Invalid email or password.")]
    WrongPassword(argon2::password_hash::Error),
    #[error("Could not hash the password")]
    ErrorHashingPassword(argon2::password_hash::Error),
    #[error("The link is invalid or has expired.")]
    InvalidToken(jsonwebtoken::errors::Error),
    #[error("The link is invalid or has expired.")]
    TokenMismatch,
    #[error("Could not sign the token")]
    TokenSigning(jsonwebtoken::errors::Error),
    #[error("This email is already registered.")]
    EmailTaken,
    #[error("This username is already in use.")]
    UsernameTaken,
    #[error("Usernames must start with a letter and contain only letters, numbers, dots or underscores.")]
    InvalidUsername,
    #[error("Passwords must match.")]
    PasswordMismatch,
    #[error("Unknown role `{0}`")]
    UnknownRole(String),
    #[error("Unknown email.")]
    UnknownEmail,
    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid form")]
    MalformedForm(#[from] serde_urlencoded::de::Error),
    #[error("Invalid CSRF token")]
    CsrfMismatch,
    #[error("You are already a member of this group.")]
    AlreadyMember,
    #[error("Your application is pending, please wait for an answer.")]
    ApplicationPending,
    #[error("You are not a member of this group.")]
    NotMember,
    #[error("The builder of a group cannot quit it.")]
    BuilderCannotQuit,
    #[error("The group is already full.")]
    GroupFull,
    #[error("Your role does not allow this.")]
    MissingPermission,
    #[error("Invalid start time, use YYYY-MM-DD HH:MM")]
    InvalidStartTime,
    #[error("Template error")]
    TemplateError(#[from] askama::Error),
    #[error("{0}")]
    CustomBadRequest(String),
    #[error("Sorry no sorry, something wrong happened")]
    CustomInternal(String),
}

impl AppError {
    pub fn custom_internal(message: &str) -> Self {
        Self::CustomInternal(message.to_owned())
    }

    pub fn custom_bad_request(message: &str) -> Self {
        Self::CustomBadRequest(message.to_owned())
    }

    /// Refusals the user can act upon. Views flash them instead of failing.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::WrongPassword(_)
                | Self::InvalidToken(_)
                | Self::TokenMismatch
                | Self::EmailTaken
                | Self::UsernameTaken
                | Self::InvalidUsername
                | Self::PasswordMismatch
                | Self::UnknownRole(_)
                | Self::UnknownEmail
                | Self::Validation(_)
                | Self::AlreadyMember
                | Self::ApplicationPending
                | Self::NotMember
                | Self::BuilderCannotQuit
                | Self::GroupFull
                | Self::MissingPermission
                | Self::InvalidStartTime
                | Self::CustomBadRequest(_)
        )
    }

    pub fn get_status_code_and_message(&self) -> (StatusCode, String) {
        let status = match self {
            Self::DoesNotExist => StatusCode::NOT_FOUND,
            Self::Forbidden | Self::CsrfMismatch | Self::MissingPermission => StatusCode::FORBIDDEN,
            Self::WrongPassword(_) => StatusCode::UNAUTHORIZED,
            Self::AlreadyMember
            | Self::ApplicationPending
            | Self::NotMember
            | Self::BuilderCannotQuit
            | Self::GroupFull
            | Self::EmailTaken
            | Self::UsernameTaken => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ErrorHashingPassword(_)
            | Self::TokenSigning(_)
            | Self::TemplateError(_)
            | Self::CustomInternal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::DoesNotExist,
            // A concurrent registration can slip past the existence checks.
            sqlx::Error::Database(e)
                if e.is_unique_violation() && e.message().contains("users.email") =>
            {
                Self::EmailTaken
            }
            sqlx::Error::Database(e)
                if e.is_unique_violation() && e.message().contains("users.username") =>
            {
                Self::UsernameTaken
            }
            e => log_and_wrap_custom_internal!(e),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorMessage {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.get_status_code_and_message();
        (status, Json(ErrorMessage { message })).into_response()
    }
}
