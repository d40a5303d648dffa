use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::{errors::AppError, sessions::Session};

#[derive(Template)]
#[template(path = "errors/error.html")]
struct ErrorTemplate<'a> {
    code: u16,
    title: &'a str,
    message: &'a str,
}

#[derive(Debug)]
pub struct HtmlError(StatusCode, String);

pub type HtmlResult = Result<Response, HtmlError>;

pub fn template_to_response<T: Template>(tmpl: &T) -> HtmlResult {
    tmpl.render()
        .map(|html| Html(html).into_response())
        .map_err(AppError::TemplateError)
        .map_err(HtmlError::from)
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        let title = self.0.canonical_reason().unwrap_or("Error");
        let template = ErrorTemplate {
            code: self.0.as_u16(),
            title,
            message: &self.1,
        };
        match template.render() {
            Ok(html) => (self.0, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "cannot render the error page");
                (self.0, self.1).into_response()
            }
        }
    }
}

impl From<AppError> for HtmlError {
    fn from(error: AppError) -> Self {
        let (status, message) = error.get_status_code_and_message();
        HtmlError(status, message)
    }
}

/// Flashes `success` or the refusal carried by `result`. Other errors are returned.
pub async fn flash_outcome<T>(
    session: &Session,
    result: Result<T, AppError>,
    success: &str,
) -> Result<Option<T>, HtmlError> {
    match result {
        Ok(value) => {
            session.info(success).await;
            Ok(Some(value))
        }
        Err(error) if error.is_refusal() => {
            session.warning(error.to_string()).await;
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}

pub async fn flash_and_redirect(session: &Session, message: &str, to: &str) -> Response {
    session.info(message).await;
    Redirect::to(to).into_response()
}

pub async fn error_404() -> HtmlError {
    AppError::DoesNotExist.into()
}
