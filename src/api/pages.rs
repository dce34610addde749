//! HTML page rendering for the views
//!
//! `Page` is extracted per request and carries the standard template
//! variables. Service errors turn into rendered error pages through
//! `Page::ok`, so handlers can use `?`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::api::csrf::csrf_token;
use crate::api::middleware::{AppState, AuthenticatedUser, SessionToken};
use crate::services::CourseServiceError;
use crate::templates::{CurrentUser, StandardTemplateVars, TemplateEngine};

pub struct Page {
    templates: Arc<TemplateEngine>,
    vars: StandardTemplateVars,
}

/// A rendered error page, returned early from a view
#[derive(Debug)]
pub struct ViewError(Response);

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        self.0
    }
}

pub type ViewResult = Result<Response, ViewError>;

impl FromRequestParts<AppState> for Page {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current_user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|u| CurrentUser::from(&u.0));
        let csrf = parts
            .extensions
            .get::<SessionToken>()
            .map(|s| csrf_token(&state.config.security.secret, &s.0));

        Ok(Page {
            templates: state.templates.clone(),
            vars: StandardTemplateVars {
                request_path: parts.uri.path().to_string(),
                current_user,
                csrf_token: csrf,
            },
        })
    }
}

impl Page {
    pub fn render(&self, template: &str, context: &TeraContext) -> Response {
        self.render_with_status(StatusCode::OK, template, context)
    }

    pub fn render_with_status(&self, status: StatusCode, template: &str, context: &TeraContext) -> Response {
        match self.templates.render_page(template, context, &self.vars) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("{}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }

    /// Error page with the given status
    pub fn error(&self, status: StatusCode, message: &str) -> ViewError {
        let mut context = TeraContext::new();
        context.insert("status", &status.as_u16());
        context.insert("message", message);
        ViewError(self.render_with_status(status, "error.html", &context))
    }

    pub fn not_found(&self) -> ViewError {
        self.error(StatusCode::NOT_FOUND, "The requested page was not found.")
    }

    /// Map a service error to its error page. Validation errors should be
    /// handled by the view before this.
    pub fn fail(&self, err: CourseServiceError) -> ViewError {
        match err {
            CourseServiceError::NotFound | CourseServiceError::InvalidKind(_) => self.not_found(),
            CourseServiceError::Forbidden => {
                self.error(StatusCode::FORBIDDEN, "You do not have permission to do that.")
            }
            CourseServiceError::Validation(errors) => {
                self.error(StatusCode::BAD_REQUEST, &errors.to_string())
            }
            CourseServiceError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                self.error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.")
            }
        }
    }

    pub fn ok<T>(&self, result: Result<T, CourseServiceError>) -> Result<T, ViewError> {
        result.map_err(|e| self.fail(e))
    }
}

/// 303 redirect after a successful POST
pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// Fallback for unknown routes
pub async fn not_found(page: Page) -> ViewError {
    page.not_found()
}
