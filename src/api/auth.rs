//! Account views: login, logout and registration

use axum::{
    extract::{Query, State},
    Extension,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::forms::FormData;
use crate::api::middleware::{AppState, MaybeUser, SessionToken, LOGIN_URL, SESSION_COOKIE};
use crate::api::pages::{redirect, Page, ViewResult};
use crate::models::{CreateUserInput, Session, User, UserRole};
use crate::services::{FormErrors, UserServiceError};

const LOGIN_REDIRECT: &str = "/course/mine/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/login/", get(login_form).post(login))
        .route("/accounts/logout/", post(logout))
        .route("/accounts/register/", get(register_form).post(register))
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub next: String,
}

/// Only same-site absolute paths are followed
fn safe_next(next: &str) -> Option<&str> {
    (next.starts_with('/') && !next.starts_with("//") && !next.contains('\\')).then_some(next)
}

fn landing_page(user: &User) -> &'static str {
    if user.is_instructor() {
        LOGIN_REDIRECT
    } else {
        "/students/courses/"
    }
}

fn session_cookie(state: &AppState, session: &Session) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session.id,
        state.config.security.session_days.max(0) * 24 * 60 * 60
    );
    HeaderValue::from_str(&cookie).ok()
}

fn with_session(state: &AppState, session: &Session, to: &str) -> Response {
    let mut response = redirect(to);
    if let Some(cookie) = session_cookie(state, session) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

fn login_page(page: &Page, status: StatusCode, username: &str, next: &str, errors: &FormErrors) -> Response {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("next", next);
    context.insert("errors", errors);
    page.render_with_status(status, "registration/login.html", &context)
}

/// GET /accounts/login/
async fn login_form(page: Page, MaybeUser(user): MaybeUser, Query(query): Query<NextQuery>) -> Response {
    if let Some(user) = user {
        return redirect(safe_next(&query.next).unwrap_or(landing_page(&user)));
    }
    login_page(&page, StatusCode::OK, "", &query.next, &FormErrors::new())
}

/// POST /accounts/login/
async fn login(State(state): State<AppState>, page: Page, form: FormData) -> ViewResult {
    let username = form.get("username").trim().to_string();
    let next = form.get("next").to_string();

    let session = match state.user_service.login(&username, form.get("password")).await {
        Ok(session) => session,
        Err(UserServiceError::AuthenticationError(message)) => {
            let mut errors = FormErrors::new();
            errors.add(FormErrors::NON_FIELD, message);
            return Ok(login_page(&page, StatusCode::BAD_REQUEST, &username, &next, &errors));
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            return Err(page.error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong."));
        }
    };

    let landing = match state.user_service.get_by_id(session.user_id).await {
        Ok(Some(user)) => landing_page(&user),
        _ => LOGIN_REDIRECT,
    };
    tracing::info!("User {} logged in", session.user_id);

    Ok(with_session(&state, &session, safe_next(&next).unwrap_or(landing)))
}

/// POST /accounts/logout/
async fn logout(State(state): State<AppState>, token: Option<Extension<SessionToken>>) -> Response {
    if let Some(Extension(SessionToken(token))) = token {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::warn!("Failed to delete session on logout: {}", e);
        }
    }

    let mut response = redirect(LOGIN_URL);
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    response
}

fn register_page(page: &Page, status: StatusCode, form: &FormData, errors: &FormErrors) -> Response {
    let mut context = TeraContext::new();
    context.insert("username", form.get("username"));
    context.insert("email", form.get("email"));
    context.insert("instructor", &form.checked("instructor"));
    context.insert("errors", errors);
    page.render_with_status(status, "registration/register.html", &context)
}

/// GET /accounts/register/
async fn register_form(page: Page) -> Response {
    register_page(&page, StatusCode::OK, &FormData::default(), &FormErrors::new())
}

/// POST /accounts/register/
async fn register(State(state): State<AppState>, page: Page, form: FormData) -> ViewResult {
    let mut errors = FormErrors::new();
    if form.get("password") != form.get("password2") {
        errors.add("password2", "The two password fields didn\u{2019}t match.");
    }

    let input = CreateUserInput {
        username: form.get("username").to_string(),
        email: form.get("email").to_string(),
        password: form.get("password").to_string(),
        role: Some(if form.checked("instructor") {
            UserRole::Instructor
        } else {
            UserRole::Student
        }),
    };

    let result = if errors.is_empty() {
        state.user_service.register(input).await
    } else {
        Err(UserServiceError::Validation(FormErrors::new()))
    };

    let user = match result {
        Ok(user) => user,
        Err(UserServiceError::Validation(more)) => {
            errors.merge(more);
            return Ok(register_page(&page, StatusCode::BAD_REQUEST, &form, &errors));
        }
        Err(e) => {
            tracing::error!("Registration failed: {}", e);
            return Err(page.error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong."));
        }
    };

    match state.user_service.login(&user.username, form.get("password")).await {
        Ok(session) => Ok(with_session(&state, &session, landing_page(&user))),
        Err(e) => {
            tracing::warn!("Registered {} but could not start a session: {}", user.username, e);
            Ok(redirect(LOGIN_URL))
        }
    }
}
