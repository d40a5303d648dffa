use std::borrow::Cow;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    auth::Viewer,
    config::Config,
    errors::AppError,
    models::{Permission, User},
    sessions::{Flash, Session},
};

use super::HtmlError;

/// What the navigation bar needs to know about the logged in user.
#[derive(Debug, Clone)]
pub struct ViewerMeta {
    pub username: String,
    pub confirmed: bool,
    pub is_administrator: bool,
    pub can_build: bool,
}

impl From<&User> for ViewerMeta {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            confirmed: user.confirmed,
            is_administrator: user.is_administrator(),
            can_build: user.can(Permission::DELIVER_CARPOOL) || user.can(Permission::GIVE_RIDE),
        }
    }
}

/// Shared context of every rendered page.
pub struct Meta<'a> {
    pub meta_title: Cow<'a, str>,
    pub csrf_token: String,
    pub flashes: Vec<Flash>,
    pub viewer: Option<ViewerMeta>,
}

/// Request-scoped handle on the session and the viewer, used to build [`Meta`].
pub struct Page {
    session: Session,
    viewer: Option<User>,
    secret: String,
}

impl Page {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn viewer(&self) -> Option<&User> {
        self.viewer.as_ref()
    }

    /// Consumes the pending flashes, call it only when a page is actually rendered.
    pub async fn meta<'a>(&self, title: impl Into<Cow<'a, str>>) -> Meta<'a> {
        Meta {
            meta_title: title.into(),
            csrf_token: self.session.csrf_token(&self.secret).await,
            flashes: self.session.take_flashes().await,
            viewer: self.viewer.as_ref().map(ViewerMeta::from),
        }
    }
}

impl<S> FromRequestParts<S> for Page
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = HtmlError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::custom_internal("The sessions middleware is missing"))?;
        let viewer = parts
            .extensions
            .get::<Viewer>()
            .cloned()
            .unwrap_or_default()
            .0;
        Ok(Self {
            session,
            viewer,
            secret: Config::from_ref(state).secret_key,
        })
    }
}
