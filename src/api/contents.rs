//! Content item views: create or edit an item of any kind inside a
//! module, delete a content entry, and the content reorder endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use tera::Context as TeraContext;

use crate::api::forms::FormData;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::pages::{redirect, Page, ViewResult};
use crate::models::{ItemKind, Module};
use crate::services::{CourseServiceError, FormErrors, ItemForm};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/module/{module_id}/content/{model_name}/create/",
            get(create_form).post(create),
        )
        .route(
            "/module/{module_id}/content/{model_name}/{id}/",
            get(edit_form).post(edit),
        )
        .route("/content/{id}/delete/", post(delete))
}

fn item_page(
    page: &Page,
    status: StatusCode,
    kind: ItemKind,
    module: &Module,
    item_id: Option<i64>,
    form: &ItemForm,
    errors: &FormErrors,
) -> Response {
    let mut context = TeraContext::new();
    context.insert("kind", kind.as_str());
    context.insert("module", module);
    context.insert("item_id", &item_id);
    context.insert("form", &json!({
        "title": form.title,
        "content": form.content,
        "url": form.url,
    }));
    context.insert("errors", errors);
    page.render_with_status(status, "courses/manage/content/form.html", &context)
}

fn item_form(mut data: FormData) -> ItemForm {
    ItemForm {
        title: data.get("title").to_string(),
        content: data.get("content").to_string(),
        url: data.get("url").to_string(),
        upload: data.take_file("file"),
    }
}

/// GET /module/{module_id}/content/{model_name}/create/
async fn create_form(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((module_id, model_name)): Path<(i64, String)>,
) -> ViewResult {
    let (kind, module, _) = page.ok(
        state.content_service.item_for_form(&model_name, module_id, user.id, None).await,
    )?;
    Ok(item_page(&page, StatusCode::OK, kind, &module, None, &ItemForm::default(), &FormErrors::new()))
}

/// GET /module/{module_id}/content/{model_name}/{id}/
async fn edit_form(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((module_id, model_name, id)): Path<(i64, String, i64)>,
) -> ViewResult {
    let (kind, module, item) = page.ok(
        state.content_service.item_for_form(&model_name, module_id, user.id, Some(id)).await,
    )?;
    let form = item.as_ref().map(ItemForm::from_item).unwrap_or_default();
    Ok(item_page(&page, StatusCode::OK, kind, &module, Some(id), &form, &FormErrors::new()))
}

async fn save(
    state: AppState,
    page: Page,
    user_id: i64,
    module_id: i64,
    model_name: String,
    existing_id: Option<i64>,
    data: FormData,
) -> ViewResult {
    let form = item_form(data);
    // kept for re-rendering; the upload itself is not echoed back
    let echo = ItemForm { upload: None, ..form.clone() };

    match state
        .content_service
        .create_or_update_item(&model_name, user_id, module_id, form, existing_id)
        .await
    {
        Ok(_) => Ok(redirect(&format!("/module/{}/", module_id))),
        Err(CourseServiceError::Validation(errors)) => {
            let (kind, module, _) = page.ok(
                state.content_service.item_for_form(&model_name, module_id, user_id, None).await,
            )?;
            Ok(item_page(&page, StatusCode::BAD_REQUEST, kind, &module, existing_id, &echo, &errors))
        }
        Err(e) => Err(page.fail(e)),
    }
}

/// POST /module/{module_id}/content/{model_name}/create/
async fn create(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((module_id, model_name)): Path<(i64, String)>,
    data: FormData,
) -> ViewResult {
    save(state, page, user.id, module_id, model_name, None, data).await
}

/// POST /module/{module_id}/content/{model_name}/{id}/
async fn edit(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((module_id, model_name, id)): Path<(i64, String, i64)>,
    data: FormData,
) -> ViewResult {
    save(state, page, user.id, module_id, model_name, Some(id), data).await
}

/// POST /content/{id}/delete/
async fn delete(
    State(state): State<AppState>,
    page: Page,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> ViewResult {
    let module_id = page.ok(state.content_service.delete_content(id, user.id).await)?;
    Ok(redirect(&format!("/module/{}/", module_id)))
}

/// POST /content/order/
///
/// Body `{"<content id>": order, ...}`. Entries whose module belongs to
/// another instructor are skipped.
pub async fn content_order(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(orders): Json<BTreeMap<String, i32>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.content_service.reorder(user.id, &orders).await?;
    Ok(Json(json!({ "saved": "OK" })))
}
