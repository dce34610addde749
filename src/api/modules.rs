//! Module views: the module formset, the content list of a module and
//! the module reorder endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use tera::Context as TeraContext;

use crate::api::forms::FormData;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::pages::{redirect, Page, ViewResult};
use crate::models::{Course, ModuleFormRow};
use crate::services::{parse_formset, CourseServiceError, FormErrors, ModuleService};
use crate::templates::TemplateEngine;

/// Page routes, behind the login guard
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course/{course}/module/", get(formset_page).post(formset_submit))
        .route("/module/{module_id}/", get(module_content_list))
}

fn render_formset(page: &Page, status: StatusCode, course: &Course, rows: &[ModuleFormRow], errors: &FormErrors) -> axum::response::Response {
    let mut context = TeraContext::new();
    context.insert("course", course);
    context.insert("rows", rows);
    context.insert("total_forms", &rows.len());
    context.insert("errors", errors);
    page.render_with_status(status, "courses/manage/module/formset.html", &context)
}

/// GET /course/{id}/module/
async fn formset_page(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> ViewResult {
    let (course, modules) = page.ok(state.module_service.list(course_id, user.id).await)?;
    let rows = ModuleService::formset_rows(&modules);
    Ok(render_formset(&page, StatusCode::OK, &course, &rows, &FormErrors::new()))
}

/// POST /course/{id}/module/
async fn formset_submit(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(course_id): Path<i64>,
    form: FormData,
) -> ViewResult {
    let (course, modules) = page.ok(state.module_service.list(course_id, user.id).await)?;

    let rows = match parse_formset(&form.fields) {
        Ok(rows) => rows,
        Err(errors) => {
            let rows = ModuleService::formset_rows(&modules);
            return Ok(render_formset(&page, StatusCode::BAD_REQUEST, &course, &rows, &errors));
        }
    };

    match state.module_service.apply_formset(course_id, user.id, &rows).await {
        Ok(_) => Ok(redirect("/course/mine/")),
        Err(CourseServiceError::Validation(errors)) => {
            Ok(render_formset(&page, StatusCode::BAD_REQUEST, &course, &rows, &errors))
        }
        Err(e) => Err(page.fail(e)),
    }
}

/// GET /module/{module_id}/
async fn module_content_list(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(module_id): Path<i64>,
) -> ViewResult {
    let listing = page.ok(state.content_service.module_contents(module_id, user.id).await)?;

    let contents: Vec<serde_json::Value> = listing
        .contents
        .iter()
        .map(|entry| {
            json!({
                "id": entry.content.id,
                "order": entry.content.order,
                "kind": entry.item.kind(),
                "item_id": entry.item.id(),
                "title": entry.presentation.title(),
                "html": render_fragment(&state.templates, entry),
            })
        })
        .collect();

    let mut context = TeraContext::new();
    context.insert("course", &listing.course);
    context.insert("module", &listing.module);
    context.insert("modules", &listing.modules);
    context.insert("contents", &contents);
    context.insert("kinds", &crate::models::ItemKind::ALL);
    Ok(page.render("courses/manage/module/content_list.html", &context))
}

fn render_fragment(templates: &TemplateEngine, entry: &crate::services::RenderedContent) -> String {
    templates.render_item(&entry.presentation).unwrap_or_else(|e| {
        tracing::error!("Failed to render content {}: {}", entry.content.id, e);
        String::new()
    })
}

/// POST /module/order/
///
/// Body `{"<module id>": order, ...}`. Ids outside the requester's
/// courses are skipped without notice.
pub async fn module_order(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(orders): Json<BTreeMap<String, i32>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.module_service.reorder(user.id, &orders).await?;
    Ok(Json(json!({ "saved": "OK" })))
}
