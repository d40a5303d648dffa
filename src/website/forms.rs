use axum::{
    body::to_bytes,
    extract::{FromRef, FromRequest, Request},
    response::{IntoResponse, Redirect, Response},
};
use serde::{de::DeserializeOwned, Deserialize};
use validator::Validate;

use crate::{config::Config, errors::AppError, sessions::Session};

use super::HtmlError;

const MAX_FORM_SIZE: usize = 64 * 1024;

#[derive(Deserialize)]
struct CsrfField {
    #[serde(default)]
    csrf_token: String,
}

/// Url-encoded form whose `csrf_token` field must match the session.
///
/// Invalid input is flashed and the client is sent back to the form it came from.
pub struct SecureForm<T>(pub T);

impl<T> SecureForm<T> {
    pub fn data(self) -> T {
        self.0
    }
}

impl<T, S> FromRequest<S> for SecureForm<T>
where
    T: DeserializeOwned + Validate + Send,
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        let back = req
            .uri()
            .path_and_query()
            .map(|p| p.as_str().to_owned())
            .unwrap_or_else(|| "/".into());
        let session = req
            .extensions()
            .get::<Session>()
            .cloned()
            .ok_or_else(|| {
                HtmlError::from(AppError::custom_internal("The sessions middleware is missing"))
                    .into_response()
            })?;

        let bytes = to_bytes(req.into_body(), MAX_FORM_SIZE)
            .await
            .map_err(|_| HtmlError::from(AppError::custom_bad_request("Form too large")).into_response())?;

        let csrf: CsrfField = serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| HtmlError::from(AppError::from(e)).into_response())?;
        if !session.token_is_valid(&config.secret_key, &csrf.csrf_token).await {
            tracing::warn!(path = %back, "rejected form with an invalid csrf token");
            return Err(HtmlError::from(AppError::CsrfMismatch).into_response());
        }

        let input = serde_urlencoded::from_bytes::<T>(&bytes)
            .map_err(AppError::from)
            .and_then(|input| input.validate().map(|_| input).map_err(AppError::from));

        match input {
            Ok(input) => Ok(Self(input)),
            Err(error) => {
                session.warning(error.to_string()).await;
                Err(Redirect::to(&back).into_response())
            }
        }
    }
}
