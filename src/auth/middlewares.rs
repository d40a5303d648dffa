use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use axum_extra::{headers::Cookie, TypedHeader};
use cookie::{time::Duration, SameSite};

use crate::{
    config::Config,
    errors::AppError,
    log_and_wrap_custom_internal,
    models::User,
    sessions::Session,
    state::AppState,
    website::HtmlError,
};

/// The user behind the session, if any.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

/// Inserted by [`login_required_middleware`] for the routes behind it.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn sessions_middleware(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    mut request: Request,
    next: Next,
) -> Result<Response, HtmlError> {
    let config = state.config();
    let session_id = cookie
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(&config.session_cookie_name));
    let session = state.sessions().find_or_create(session_id).await?;

    let viewer = match session.user_pk().await {
        Some(user_pk) => {
            let mut conn = state.database().acquire().await.map_err(AppError::from)?;
            match User::get_by_pk(user_pk, &mut conn).await {
                Ok(user) => Some(user),
                Err(AppError::DoesNotExist) => None,
                Err(e) => return Err(e.into()),
            }
        }
        None => None,
    };

    request.extensions_mut().insert(session.clone());
    request.extensions_mut().insert(Viewer(viewer));

    let mut response = next.run(request).await;

    state
        .sessions()
        .save(&session, config.session_expiration.max(0) as u64)
        .await?;
    set_session_cookies(response.headers_mut(), &session, config).await?;

    Ok(response)
}

/// Accounts waiting for their confirmation only reach the `/auth` pages.
pub async fn unconfirmed_middleware(
    Extension(viewer): Extension<Viewer>,
    request: Request,
    next: Next,
) -> Response {
    let unconfirmed = viewer.0.as_ref().is_some_and(|user| !user.confirmed);
    if unconfirmed && !request.uri().path().starts_with("/auth") {
        return Redirect::to("/auth/unconfirmed").into_response();
    }
    next.run(request).await
}

pub async fn login_required_middleware(
    Extension(viewer): Extension<Viewer>,
    Extension(session): Extension<Session>,
    mut request: Request,
    next: Next,
) -> Response {
    match viewer.0 {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        None => {
            let target = request
                .uri()
                .path_and_query()
                .map(|p| p.as_str())
                .unwrap_or("/");
            let query = serde_urlencoded::to_string([("next", target)]).unwrap_or_default();
            session.info("Please log in to access this page.").await;
            Redirect::to(&format!("/auth/login?{query}")).into_response()
        }
    }
}

/// Must sit behind [`login_required_middleware`].
pub async fn admin_required_middleware(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, HtmlError> {
    if !user.is_administrator() {
        tracing::warn!(user_pk = user.pk, path = %request.uri(), "administrator required");
        return Err(AppError::Forbidden.into());
    }
    Ok(next.run(request).await)
}

pub async fn set_session_cookies(
    headers: &mut HeaderMap<HeaderValue>,
    session: &Session,
    config: &Config,
) -> Result<(), AppError> {
    let remember = session.remember().await;
    let cookies = [
        (
            config.csrf_cookie_name.as_str(),
            session.csrf_token(&config.secret_key).await,
            false,
        ),
        (config.session_cookie_name.as_str(), session.id().await, true),
    ];

    for (name, value, http_only) in cookies {
        let mut builder = cookie::Cookie::build((name, value))
            .path("/")
            .secure(config.is_production())
            .http_only(http_only)
            .same_site(SameSite::Lax);
        if remember {
            builder = builder.max_age(Duration::days(config.session_expiration));
        }
        if config.is_production() {
            builder = builder.domain(config.domain().to_owned());
        }

        headers.append(
            SET_COOKIE,
            HeaderValue::from_bytes(builder.build().encoded().to_string().as_bytes())
                .map_err(|e| log_and_wrap_custom_internal!(e))?,
        );
    }

    if config.is_production() {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    Ok(())
}
