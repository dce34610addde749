//! Shared setup for the HTTP integration tests

#![allow(dead_code)]

use axum_test::http::HeaderName;
use axum_test::TestServer;
use tempfile::TempDir;

use educa::api::{build_router, csrf::csrf_token, AppState};
use educa::config::Config;
use educa::db::{create_test_pool, migrations::run_migrations};
use educa::models::{Course, CourseInput, CreateUserInput, Module, NewModule, Subject, SubjectInput, User, UserRole};

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub admin: User,
    pub admin_token: String,
    pub subject: Subject,
    _media: TempDir,
}

/// Migrated in-memory database, a media directory and the first (admin)
/// account with one subject
pub async fn spawn_app() -> TestApp {
    let media = TempDir::new().expect("media dir");
    let pool = create_test_pool().await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let mut config = Config::default();
    config.upload.path = media.path().to_path_buf();

    let state = AppState::new(config, pool).expect("state");
    let server = TestServer::new(build_router(state.clone())).expect("Failed to create test server");

    let (admin, admin_token) = register(&state, "root", UserRole::Admin).await;
    let subject = state
        .subject_service
        .create(
            &admin,
            &SubjectInput {
                title: "Mathematics".to_string(),
                slug: "mathematics".to_string(),
            },
        )
        .await
        .expect("subject");

    TestApp {
        server,
        state,
        admin,
        admin_token,
        subject,
        _media: media,
    }
}

/// Register an account and open a session for it
pub async fn register(state: &AppState, username: &str, role: UserRole) -> (User, String) {
    let user = state
        .user_service
        .register(CreateUserInput {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: PASSWORD.to_string(),
            role: Some(role),
        })
        .await
        .expect("register");
    let session = state.user_service.login(username, PASSWORD).await.expect("login");
    (user, session.id)
}

pub fn authorization() -> HeaderName {
    HeaderName::from_static("authorization")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn csrf_header() -> HeaderName {
    HeaderName::from_static("x-csrf-token")
}

pub fn csrf_for(app: &TestApp, token: &str) -> String {
    csrf_token(&app.state.config.security.secret, token)
}

pub async fn create_course(app: &TestApp, owner: &User, slug: &str) -> Course {
    app.state
        .course_service
        .create(
            owner,
            &CourseInput {
                subject_id: app.subject.id.to_string(),
                title: format!("Course {}", slug),
                slug: slug.to_string(),
                overview: "An overview.".to_string(),
            },
        )
        .await
        .expect("course")
}

pub async fn create_module(app: &TestApp, owner: &User, course: &Course, title: &str) -> Module {
    app.state
        .module_service
        .create(
            NewModule {
                course_id: course.id,
                title: title.to_string(),
                description: String::new(),
                order: None,
            },
            owner.id,
        )
        .await
        .expect("module")
}
