//! Public catalogue, course pages and student enrollment

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, AuthenticatedUser, MaybeUser};
use crate::api::pages::{redirect, Page, ViewResult};

/// Pages anyone may see
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(catalogue))
        .route("/subject/{slug}/", get(subject_catalogue))
        .route("/course/{course}/", get(course_detail))
}

/// Pages behind the login guard
pub fn student_router() -> Router<AppState> {
    Router::new()
        .route("/course/{course}/enroll/", post(enroll))
        .route("/students/courses/", get(student_courses))
}

async fn render_catalogue(state: &AppState, page: &Page, slug: Option<&str>) -> ViewResult {
    let subject = match slug {
        Some(slug) => Some(page.ok(state.subject_service.get_by_slug(slug).await)?),
        None => None,
    };
    let subjects = page.ok(state.subject_service.list().await)?;
    let courses = page.ok(
        state
            .course_service
            .catalogue(subject.as_ref().map(|s| s.id))
            .await,
    )?;

    let mut context = TeraContext::new();
    context.insert("subject", &subject);
    context.insert("subjects", &subjects);
    context.insert("courses", &courses);
    Ok(page.render("courses/course/list.html", &context))
}

/// GET /
async fn catalogue(State(state): State<AppState>, page: Page) -> ViewResult {
    render_catalogue(&state, &page, None).await
}

/// GET /subject/{slug}/
async fn subject_catalogue(
    State(state): State<AppState>,
    page: Page,
    Path(slug): Path<String>,
) -> ViewResult {
    render_catalogue(&state, &page, Some(&slug)).await
}

/// GET /course/{slug}/
async fn course_detail(
    State(state): State<AppState>,
    page: Page,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
) -> ViewResult {
    let detail = page.ok(state.course_service.detail(&slug).await)?;
    let enrolled = match &user {
        Some(user) => page.ok(
            state
                .course_service
                .is_enrolled(detail.course.id, user.id)
                .await,
        )?,
        None => false,
    };

    let mut context = TeraContext::new();
    context.insert("course", &detail.course);
    context.insert("subject", &detail.subject);
    context.insert("modules", &detail.modules);
    context.insert("enrolled", &enrolled);
    Ok(page.render("courses/course/detail.html", &context))
}

/// POST /course/{id}/enroll/
async fn enroll(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> ViewResult {
    let course = page.ok(state.course_service.enroll(course_id, &user).await)?;
    Ok(redirect(&format!("/course/{}/", course.slug)))
}

/// GET /students/courses/
async fn student_courses(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ViewResult {
    let courses = page.ok(state.course_service.enrolled(&user).await)?;

    let mut context = TeraContext::new();
    context.insert("courses", &courses);
    Ok(page.render("students/course/list.html", &context))
}
