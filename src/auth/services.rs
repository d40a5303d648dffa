use askama::Template;

use crate::{
    errors::AppError,
    models::{validate_username, NewUser, Role, RoleName, User},
    state::AppState,
};

use super::tokens::TokenAction;

#[derive(Template)]
#[template(path = "auth/email/confirm.txt")]
struct ConfirmEmail<'a> {
    username: &'a str,
    url: &'a str,
}

#[derive(Template)]
#[template(path = "auth/email/reset_password.txt")]
struct ResetPasswordEmail<'a> {
    username: &'a str,
    url: &'a str,
}

pub struct Registration<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub password2: &'a str,
    pub role: RoleName,
}

fn passwords_match(password: &str, password2: &str) -> Result<(), AppError> {
    if password != password2 {
        return Err(AppError::PasswordMismatch);
    }
    Ok(())
}

/// Creates an unconfirmed account and mails its confirmation link.
///
/// The configured admin email always gets the administrator role.
pub async fn register(state: &AppState, input: Registration<'_>) -> Result<User, AppError> {
    validate_username(input.username)?;
    passwords_match(input.password, input.password2)?;

    let mut tx = state.database().start_transaction().await?;
    if User::email_exists(input.email, &mut tx).await? {
        return Err(AppError::EmailTaken);
    }
    if User::username_exists(input.username, &mut tx).await? {
        return Err(AppError::UsernameTaken);
    }

    let role = if input.email == state.config().admin_email {
        Role::find_administrator(&mut tx).await?
    } else {
        Role::find_by_name(input.role, &mut tx).await?
    };
    let user = User::create(
        NewUser {
            email: input.email,
            username: input.username,
            password: input.password,
            role: role.as_ref(),
        },
        &mut tx,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_pk = user.pk, role = ?user.role_name, "registered user");
    send_confirmation(state, &user).await?;
    Ok(user)
}

pub async fn send_confirmation(state: &AppState, user: &User) -> Result<(), AppError> {
    let token = state.keys().generate(user.pk, TokenAction::Confirm)?;
    let url = state.config().build_url(&format!("/auth/confirm/{token}"));
    state
        .mailer()
        .send_template(
            &user.email,
            "Confirm Your Account",
            &ConfirmEmail {
                username: &user.username,
                url: &url,
            },
        )
        .await
}

pub async fn confirm(state: &AppState, user: &mut User, token: &str) -> Result<(), AppError> {
    state.keys().verify(token, user.pk, TokenAction::Confirm)?;
    let mut conn = state.database().acquire().await?;
    user.set_confirmed(&mut conn).await
}

/// Unknown emails and wrong passwords are indistinguishable to the caller.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> Result<User, AppError> {
    let mut conn = state.database().acquire().await?;
    let user = User::find_by_email(email, &mut conn)
        .await?
        .ok_or(AppError::WrongPassword(argon2::password_hash::Error::Password))?;
    user.verify_password(password)?;
    Ok(user)
}

pub async fn change_password(
    state: &AppState,
    user: &mut User,
    old_password: &str,
    password: &str,
    password2: &str,
) -> Result<(), AppError> {
    passwords_match(password, password2)?;
    user.verify_password(old_password)?;
    let mut conn = state.database().acquire().await?;
    user.set_password(password, &mut conn).await
}

pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let mut conn = state.database().acquire().await?;
    let user = User::find_by_email(email, &mut conn)
        .await?
        .ok_or(AppError::UnknownEmail)?;
    drop(conn);

    let token = state.keys().generate(user.pk, TokenAction::ResetPassword)?;
    let url = state.config().build_url(&format!("/auth/reset/{token}"));
    state
        .mailer()
        .send_template(
            &user.email,
            "Reset your password",
            &ResetPasswordEmail {
                username: &user.username,
                url: &url,
            },
        )
        .await
}

/// The token has to belong to the account behind `email`.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    email: &str,
    password: &str,
    password2: &str,
) -> Result<(), AppError> {
    passwords_match(password, password2)?;
    let mut conn = state.database().acquire().await?;
    let mut user = User::find_by_email(email, &mut conn)
        .await?
        .ok_or(AppError::UnknownEmail)?;
    state
        .keys()
        .verify(token, user.pk, TokenAction::ResetPassword)?;
    user.set_password(password, &mut conn).await?;
    tracing::info!(user_pk = user.pk, "password reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, database::TestDatabase, models::Permission};

    async fn setup() -> (TestDatabase, AppState) {
        let database = TestDatabase::setup().await;
        let state = AppState::with_database(Config::stub(), database.database().clone());
        (database, state)
    }

    fn registration<'a>(email: &'a str, username: &'a str, role: RoleName) -> Registration<'a> {
        Registration {
            email,
            username,
            password: "cat",
            password2: "cat",
            role,
        }
    }

    fn token_from_last_email(body: &str, prefix: &str) -> String {
        let start = body.find(prefix).unwrap() + prefix.len();
        body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn test_register_sends_confirmation() {
        let (_database, state) = setup().await;
        let user = register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();
        assert!(!user.confirmed);
        assert!(user.is_student());

        let outbox = state.mailer().outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "john@example.com");
        assert_eq!(outbox[0].subject, "[Carpool] Confirm Your Account");
        assert!(outbox[0].body.contains("http://localhost:8000/auth/confirm/"));
    }

    #[tokio::test]
    async fn test_admin_email_gets_administrator_role() {
        let (_database, state) = setup().await;
        let user = register(&state, registration("admin@example.com", "admin", RoleName::Teacher))
            .await
            .unwrap();
        assert!(user.can(Permission::ADMINISTER));
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let (_database, state) = setup().await;
        register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();

        let error = register(&state, registration("john@example.com", "other", RoleName::Student))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::EmailTaken));

        let error = register(&state, registration("other@example.com", "john", RoleName::Student))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::UsernameTaken));

        let error = register(&state, registration("other@example.com", "1john", RoleName::Student))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::InvalidUsername));

        let mut mismatch = registration("other@example.com", "other", RoleName::Student);
        mismatch.password2 = "dog";
        let error = register(&state, mismatch).await.unwrap_err();
        assert!(matches!(error, AppError::PasswordMismatch));
    }

    #[tokio::test]
    async fn test_confirm_with_mailed_token() {
        let (_database, state) = setup().await;
        let mut user = register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();
        let body = &state.mailer().outbox().await[0].body;
        let token = token_from_last_email(body, "/auth/confirm/");

        assert!(confirm(&state, &mut user, "garbage").await.is_err());
        confirm(&state, &mut user, &token).await.unwrap();
        assert!(user.confirmed);
    }

    #[tokio::test]
    async fn test_confirm_token_of_another_user_is_refused() {
        let (_database, state) = setup().await;
        let john = register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();
        let mut jane = register(&state, registration("jane@example.com", "jane", RoleName::Student))
            .await
            .unwrap();
        let token = state.keys().generate(john.pk, TokenAction::Confirm).unwrap();

        let error = confirm(&state, &mut jane, &token).await.unwrap_err();
        assert!(matches!(error, AppError::TokenMismatch));
        assert!(!jane.confirmed);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (_database, state) = setup().await;
        register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();

        assert!(authenticate(&state, "john@example.com", "cat").await.is_ok());
        assert!(matches!(
            authenticate(&state, "john@example.com", "dog").await,
            Err(AppError::WrongPassword(_))
        ));
        assert!(matches!(
            authenticate(&state, "nobody@example.com", "cat").await,
            Err(AppError::WrongPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_requires_old_password() {
        let (_database, state) = setup().await;
        let mut user = register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();

        let error = change_password(&state, &mut user, "dog", "new", "new")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::WrongPassword(_)));

        change_password(&state, &mut user, "cat", "new", "new")
            .await
            .unwrap();
        assert!(authenticate(&state, "john@example.com", "new").await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (_database, state) = setup().await;
        register(&state, registration("john@example.com", "john", RoleName::Student))
            .await
            .unwrap();
        register(&state, registration("jane@example.com", "jane", RoleName::Student))
            .await
            .unwrap();

        assert!(matches!(
            request_password_reset(&state, "nobody@example.com").await,
            Err(AppError::UnknownEmail)
        ));

        request_password_reset(&state, "john@example.com")
            .await
            .unwrap();
        let outbox = state.mailer().outbox().await;
        let email = outbox.last().unwrap();
        assert_eq!(email.subject, "[Carpool] Reset your password");
        let token = token_from_last_email(&email.body, "/auth/reset/");

        let error = reset_password(&state, &token, "jane@example.com", "new", "new")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::TokenMismatch));

        let confirm_token = state.keys().generate(1, TokenAction::Confirm).unwrap();
        let error = reset_password(&state, &confirm_token, "john@example.com", "new", "new")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::TokenMismatch));

        reset_password(&state, &token, "john@example.com", "new", "new")
            .await
            .unwrap();
        assert!(authenticate(&state, "john@example.com", "new").await.is_ok());
    }
}
