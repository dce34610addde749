//! HTTP layer: views, JSON endpoints and routing
//!
//! - `auth`: login, logout and registration
//! - `courses`: instructor course management and subject creation
//! - `modules`: the module formset, module content lists, module reordering
//! - `contents`: item create/edit/delete, content reordering
//! - `catalog`: public catalogue, course pages and enrollment

pub mod auth;
pub mod catalog;
pub mod contents;
pub mod courses;
pub mod csrf;
pub mod forms;
pub mod middleware;
pub mod modules;
pub mod pages;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::post,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use middleware::{ApiError, AppState};

/// Headroom over the largest upload for the other form fields
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // JSON reorder endpoints (need a session and a CSRF token)
    let order_routes = Router::new()
        .route("/module/order/", post(modules::module_order))
        .route("/content/order/", post(contents::content_order))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), csrf::require_csrf))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    // Pages that redirect anonymous visitors to the login form
    let login_routes = Router::new()
        .merge(courses::router())
        .merge(modules::router())
        .merge(contents::router())
        .merge(catalog::student_router())
        .route_layer(axum_middleware::from_fn(middleware::require_login));

    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);
    let media = ServeDir::new(state.storage.root());
    let media_prefix = match state.storage.url_prefix() {
        "" => "/media".to_string(),
        prefix => prefix.to_string(),
    };

    Router::new()
        .merge(auth::router())
        .merge(catalog::public_router())
        .merge(login_routes)
        .merge(order_routes)
        .nest_service(&media_prefix, media)
        .fallback(pages::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::load_session))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
