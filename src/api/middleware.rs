//! API middleware
//!
//! Contains:
//! - the shared application state
//! - the JSON error type
//! - session loading plus the login/auth guards
//! - extractors for the current user

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::*;
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ContentService, CourseService, CourseServiceError, MediaStorage, ModuleService, SubjectService,
    UserService,
};
use crate::templates::{TemplateEngine, TemplateError};

pub const SESSION_COOKIE: &str = "session";

pub const LOGIN_URL: &str = "/accounts/login/";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub course_service: Arc<CourseService>,
    pub subject_service: Arc<SubjectService>,
    pub module_service: Arc<ModuleService>,
    pub content_service: Arc<ContentService>,
    pub storage: Arc<MediaStorage>,
    pub templates: Arc<TemplateEngine>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(config: Config, pool: DynDatabasePool) -> Result<Self, TemplateError> {
        let storage = Arc::new(MediaStorage::new(&config.upload));
        let cache = create_cache(&config.cache);

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let subject_repo = SqlxSubjectRepository::boxed(pool.clone());
        let course_repo = SqlxCourseRepository::boxed(pool.clone());
        let module_repo = SqlxModuleRepository::boxed(pool.clone());
        let content_repo = SqlxContentRepository::boxed(pool.clone());
        let item_repo = SqlxItemRepository::boxed(pool.clone());
        let ordering = SqlxOrderingRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::with_session_expiration(
            user_repo,
            session_repo,
            config.security.session_days,
        ));
        let course_service = Arc::new(CourseService::new(
            course_repo.clone(),
            subject_repo.clone(),
            module_repo.clone(),
            content_repo.clone(),
            item_repo.clone(),
            storage.clone(),
            cache.clone(),
        ));
        let subject_service = Arc::new(SubjectService::new(subject_repo, cache));
        let module_service = Arc::new(ModuleService::new(
            module_repo.clone(),
            course_repo.clone(),
            content_repo.clone(),
            item_repo.clone(),
            ordering.clone(),
            storage.clone(),
        ));
        let content_service = Arc::new(ContentService::new(
            content_repo,
            item_repo,
            module_repo,
            course_repo,
            ordering,
            storage.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            user_service,
            course_service,
            subject_service,
            module_service,
            content_service,
            storage,
            templates: Arc::new(TemplateEngine::new()?),
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The current user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Session token of the current request
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" | "INVALID_KIND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(err: CourseServiceError) -> Self {
        match err {
            CourseServiceError::NotFound => ApiError::not_found("Not found"),
            CourseServiceError::Forbidden => ApiError::forbidden("Permission denied"),
            CourseServiceError::InvalidKind(kind) => {
                ApiError::new("INVALID_KIND", format!("Invalid content kind: {}", kind))
            }
            CourseServiceError::Validation(errors) => ApiError::with_details(
                "VALIDATION_ERROR",
                "Invalid input",
                serde_json::to_value(&errors).unwrap_or_default(),
            ),
            CourseServiceError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Session token from the `session` cookie or a bearer header
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_str) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    let cookie_str = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookie_str
        .split(';')
        .filter_map(|cookie| cookie.trim().strip_prefix("session="))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Attach the user and session token when the request carries a valid
/// session. Never rejects.
pub async fn load_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_session_token(&request) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
                request.extensions_mut().insert(SessionToken(token));
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Session validation failed: {:#}", e),
        }
    }
    next.run(request).await
}

/// Authentication guard for JSON endpoints
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    Ok(next.run(request).await)
}

/// Authentication guard for pages: anonymous visitors go to the login page
pub async fn require_login(request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return next.run(request).await;
    }

    let next_path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&format!("{}?next={}", LOGIN_URL, urlencoding::encode(next_path))).into_response()
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
