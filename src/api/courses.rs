//! Instructor course management views and subject creation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::api::forms::FormData;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::pages::{redirect, Page, ViewResult};
use crate::models::{Course, CourseInput, SubjectInput};
use crate::services::{CourseServiceError, FormErrors};

const COURSE_LIST: &str = "/course/mine/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course/mine/", get(manage_course_list))
        .route("/course/create/", get(create_form).post(create))
        .route("/course/{course}/edit/", get(edit_form).post(edit))
        .route("/course/{course}/delete/", get(delete_confirm).post(delete))
        .route("/subject/create/", get(subject_form).post(create_subject))
}

fn course_input(form: &FormData) -> CourseInput {
    CourseInput {
        subject_id: form.get("subject_id").to_string(),
        title: form.get("title").to_string(),
        slug: form.get("slug").to_string(),
        overview: form.get("overview").to_string(),
    }
}

fn input_of(course: &Course) -> CourseInput {
    CourseInput {
        subject_id: course.subject_id.to_string(),
        title: course.title.clone(),
        slug: course.slug.clone(),
        overview: course.overview.clone(),
    }
}

async fn course_form_page(
    state: &AppState,
    page: &Page,
    status: StatusCode,
    course: Option<&Course>,
    input: &CourseInput,
    errors: &FormErrors,
) -> ViewResult {
    let subjects = page.ok(state.subject_service.list().await)?;

    let mut context = TeraContext::new();
    context.insert("course", &course);
    context.insert("form", &serde_json::json!({
        "subject_id": input.subject_id,
        "title": input.title,
        "slug": input.slug,
        "overview": input.overview,
    }));
    context.insert("subjects", &subjects);
    context.insert("errors", errors);
    Ok(page.render_with_status(status, "courses/manage/course/form.html", &context))
}

/// GET /course/mine/
async fn manage_course_list(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ViewResult {
    let courses = page.ok(state.course_service.list_owned(&user).await)?;

    let mut context = TeraContext::new();
    context.insert("courses", &courses);
    Ok(page.render("courses/manage/course/list.html", &context))
}

/// GET /course/create/
async fn create_form(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ViewResult {
    if !user.is_instructor() {
        return Err(page.fail(CourseServiceError::Forbidden));
    }
    course_form_page(&state, &page, StatusCode::OK, None, &CourseInput::default(), &FormErrors::new()).await
}

/// POST /course/create/
async fn create(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    form: FormData,
) -> ViewResult {
    let input = course_input(&form);
    match state.course_service.create(&user, &input).await {
        Ok(_) => Ok(redirect(COURSE_LIST)),
        Err(CourseServiceError::Validation(errors)) => {
            course_form_page(&state, &page, StatusCode::BAD_REQUEST, None, &input, &errors).await
        }
        Err(e) => Err(page.fail(e)),
    }
}

/// GET /course/{id}/edit/
async fn edit_form(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ViewResult {
    if !user.is_instructor() {
        return Err(page.fail(CourseServiceError::Forbidden));
    }
    let course = page.ok(state.course_service.get_owned(id, user.id).await)?;
    course_form_page(&state, &page, StatusCode::OK, Some(&course), &input_of(&course), &FormErrors::new()).await
}

/// POST /course/{id}/edit/
async fn edit(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    form: FormData,
) -> ViewResult {
    let input = course_input(&form);
    match state.course_service.update(id, &user, &input).await {
        Ok(_) => Ok(redirect(COURSE_LIST)),
        Err(CourseServiceError::Validation(errors)) => {
            let course = page.ok(state.course_service.get_owned(id, user.id).await)?;
            course_form_page(&state, &page, StatusCode::BAD_REQUEST, Some(&course), &input, &errors).await
        }
        Err(e) => Err(page.fail(e)),
    }
}

/// GET /course/{id}/delete/
async fn delete_confirm(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ViewResult {
    if !user.is_instructor() {
        return Err(page.fail(CourseServiceError::Forbidden));
    }
    let course = page.ok(state.course_service.get_owned(id, user.id).await)?;

    let mut context = TeraContext::new();
    context.insert("course", &course);
    Ok(page.render("courses/manage/course/delete.html", &context))
}

/// POST /course/{id}/delete/
async fn delete(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ViewResult {
    page.ok(state.course_service.delete(id, &user).await)?;
    Ok(redirect(COURSE_LIST))
}

fn subject_page(page: &Page, status: StatusCode, input: &SubjectInput, errors: &FormErrors) -> Response {
    let mut context = TeraContext::new();
    context.insert("title", &input.title);
    context.insert("slug", &input.slug);
    context.insert("errors", errors);
    page.render_with_status(status, "courses/manage/subject/form.html", &context)
}

/// GET /subject/create/
async fn subject_form(page: Page, AuthenticatedUser(user): AuthenticatedUser) -> ViewResult {
    if !user.is_admin() {
        return Err(page.fail(CourseServiceError::Forbidden));
    }
    Ok(subject_page(&page, StatusCode::OK, &SubjectInput::default(), &FormErrors::new()))
}

/// POST /subject/create/
async fn create_subject(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    form: FormData,
) -> ViewResult {
    let input = SubjectInput {
        title: form.get("title").to_string(),
        slug: form.get("slug").to_string(),
    };
    match state.subject_service.create(&user, &input).await {
        Ok(subject) => Ok(redirect(&format!("/subject/{}/", subject.slug))),
        Err(CourseServiceError::Validation(errors)) => {
            Ok(subject_page(&page, StatusCode::BAD_REQUEST, &input, &errors))
        }
        Err(e) => Err(page.fail(e)),
    }
}
