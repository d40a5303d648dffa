use askama::Template;
use axum::{
    extract::{Path, Query, State},
    middleware,
    response::{IntoResponse, Redirect},
    routing::get,
    Extension, Router,
};

use crate::{
    errors::AppError,
    state::AppState,
    website::{
        flash_and_redirect, flash_outcome, template_to_response, HtmlResult, Meta, Page,
        SecureForm,
    },
};

use super::{
    forms::{
        ChangePasswordForm, LoginForm, NextQuery, RegisterForm, ResetPasswordForm,
        ResetRequestForm,
    },
    middlewares::{login_required_middleware, CurrentUser},
    services::{self, Registration},
};

pub fn routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/logout", get(logout))
        .route("/auth/confirm", get(resend_confirmation))
        .route("/auth/confirm/{token}", get(confirm))
        .route(
            "/auth/change-password",
            get(change_password).post(post_change_password),
        )
        .route_layer(middleware::from_fn(login_required_middleware));

    Router::new()
        .route("/auth/login", get(login).post(post_login))
        .route("/auth/register", get(register).post(post_register))
        .route("/auth/unconfirmed", get(unconfirmed))
        .route("/auth/reset", get(reset_request).post(post_reset_request))
        .route("/auth/reset/{token}", get(reset).post(post_reset))
        .merge(protected)
}

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate<'a> {
    meta: Meta<'a>,
    action: String,
}

async fn login(page: Page, Query(query): Query<NextQuery>) -> HtmlResult {
    let action = match query.next {
        Some(_) => format!(
            "/auth/login?{}",
            serde_urlencoded::to_string([("next", query.redirect_target())]).unwrap_or_default()
        ),
        None => "/auth/login".into(),
    };
    template_to_response(&LoginTemplate {
        meta: page.meta("Login").await,
        action,
    })
}

async fn post_login(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<NextQuery>,
    form: SecureForm<LoginForm>,
) -> HtmlResult {
    let input = form.data();
    match services::authenticate(&state, &input.email, &input.password).await {
        Ok(user) => {
            state
                .sessions()
                .login(page.session(), user.pk, input.remember())
                .await?;
            tracing::info!(user_pk = user.pk, "logged in");
            Ok(Redirect::to(query.redirect_target()).into_response())
        }
        Err(AppError::WrongPassword(_)) => {
            page.session().warning("Invalid email or password.").await;
            Ok(Redirect::to("/auth/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn logout(State(state): State<AppState>, page: Page) -> HtmlResult {
    state.sessions().logout(page.session()).await?;
    Ok(flash_and_redirect(page.session(), "You have been logged out.", "/").await)
}

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate<'a> {
    meta: Meta<'a>,
}

async fn register(page: Page) -> HtmlResult {
    template_to_response(&RegisterTemplate {
        meta: page.meta("Register").await,
    })
}

async fn post_register(
    State(state): State<AppState>,
    page: Page,
    form: SecureForm<RegisterForm>,
) -> HtmlResult {
    let input = form.data();
    let result = match input.role() {
        Ok(role) => {
            services::register(
                &state,
                Registration {
                    email: &input.email,
                    username: &input.username,
                    password: &input.password,
                    password2: &input.password2,
                    role,
                },
            )
            .await
        }
        Err(e) => Err(e),
    };
    let sent = "A confirmation email has been sent to you by email.";
    match flash_outcome(page.session(), result, sent).await? {
        Some(_) => Ok(Redirect::to("/").into_response()),
        None => Ok(Redirect::to("/auth/register").into_response()),
    }
}

async fn resend_confirmation(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    services::send_confirmation(&state, &user).await?;
    Ok(flash_and_redirect(
        page.session(),
        "A new confirmation email has been sent to you by email.",
        "/",
    )
    .await)
}

async fn confirm(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    Path(token): Path<String>,
) -> HtmlResult {
    if user.confirmed {
        return Ok(Redirect::to("/").into_response());
    }
    match services::confirm(&state, &mut user, &token).await {
        Ok(()) => {
            page.session()
                .info("You have confirmed your account. Thanks!")
                .await
        }
        Err(AppError::InvalidToken(_) | AppError::TokenMismatch) => {
            page.session()
                .warning("The confirmation link is invalid or has expired.")
                .await
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Redirect::to("/").into_response())
}

#[derive(Template)]
#[template(path = "auth/unconfirmed.html")]
struct UnconfirmedTemplate<'a> {
    meta: Meta<'a>,
    email: String,
}

async fn unconfirmed(page: Page) -> HtmlResult {
    let email = match page.viewer() {
        Some(user) if !user.confirmed => user.email.clone(),
        _ => return Ok(Redirect::to("/").into_response()),
    };
    template_to_response(&UnconfirmedTemplate {
        meta: page.meta("Confirm your account").await,
        email,
    })
}

#[derive(Template)]
#[template(path = "auth/change_password.html")]
struct ChangePasswordTemplate<'a> {
    meta: Meta<'a>,
}

async fn change_password(page: Page) -> HtmlResult {
    template_to_response(&ChangePasswordTemplate {
        meta: page.meta("Change password").await,
    })
}

async fn post_change_password(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    form: SecureForm<ChangePasswordForm>,
) -> HtmlResult {
    let input = form.data();
    let result = services::change_password(
        &state,
        &mut user,
        &input.old_password,
        &input.password,
        &input.password2,
    )
    .await;
    match result {
        Ok(()) => Ok(flash_and_redirect(page.session(), "Your password has been updated!", "/").await),
        Err(AppError::WrongPassword(_)) => {
            page.session().warning("Invalid password.").await;
            Ok(Redirect::to("/auth/change-password").into_response())
        }
        Err(e) if e.is_refusal() => {
            page.session().warning(e.to_string()).await;
            Ok(Redirect::to("/auth/change-password").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Template)]
#[template(path = "auth/reset_request.html")]
struct ResetRequestTemplate<'a> {
    meta: Meta<'a>,
}

async fn reset_request(page: Page) -> HtmlResult {
    if page.viewer().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    template_to_response(&ResetRequestTemplate {
        meta: page.meta("Reset your password").await,
    })
}

async fn post_reset_request(
    State(state): State<AppState>,
    page: Page,
    form: SecureForm<ResetRequestForm>,
) -> HtmlResult {
    if page.viewer().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let result = services::request_password_reset(&state, &form.data().email).await;
    let sent = "An email with instructions to reset your password has been sent to you.";
    match flash_outcome(page.session(), result, sent).await? {
        Some(()) => Ok(Redirect::to("/auth/login").into_response()),
        None => Ok(Redirect::to("/auth/reset").into_response()),
    }
}

#[derive(Template)]
#[template(path = "auth/reset_password.html")]
struct ResetPasswordTemplate<'a> {
    meta: Meta<'a>,
    action: String,
}

async fn reset(page: Page, Path(token): Path<String>) -> HtmlResult {
    if page.viewer().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    template_to_response(&ResetPasswordTemplate {
        meta: page.meta("Reset your password").await,
        action: format!("/auth/reset/{token}"),
    })
}

async fn post_reset(
    State(state): State<AppState>,
    page: Page,
    Path(token): Path<String>,
    form: SecureForm<ResetPasswordForm>,
) -> HtmlResult {
    if page.viewer().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let input = form.data();
    let result =
        services::reset_password(&state, &token, &input.email, &input.password, &input.password2)
            .await;
    let session = page.session();
    let to = match result {
        Ok(()) => {
            session.info("Your password has been reset.").await;
            "/auth/login".to_owned()
        }
        Err(AppError::UnknownEmail) => {
            session.warning("The email has not been registered.").await;
            "/auth/register".to_owned()
        }
        Err(AppError::InvalidToken(_) | AppError::TokenMismatch) => {
            session
                .warning("Your reset password link is invalid or has expired.")
                .await;
            "/auth/reset".to_owned()
        }
        Err(e) if e.is_refusal() => {
            session.warning(e.to_string()).await;
            format!("/auth/reset/{token}")
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Redirect::to(&to).into_response())
}
